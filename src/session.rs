//! Channel session: connect sequence, request/response exchanges and keep-alive.

use crate::{
    error::{MowerError, Result},
    protocol::{payload_slice, result_code, FrameCodec, ResultCode},
    reassembly::{Reassembler, WaitError},
    schema::{CommandDescriptor, CommandTable, Params, Response},
    transport::{write_frame, Transport},
    types::SessionConfig,
};
use bytes::Bytes;
use std::{
    fmt,
    sync::{Arc, Weak},
};
use tokio::{
    sync::{Mutex, Notify, RwLock},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, error, info, warn};

/// Name of the PIN command in the schema
pub const PIN_COMMAND: &str = "pin";

/// Name of the keep-alive command in the schema
pub const KEEPALIVE_COMMAND: &str = "KeepAlive";

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected yet
    Idle,
    /// Setup frame sent, waiting for the device to accept the channel
    ChannelSetup,
    /// Handshake frame sent
    Handshake,
    /// PIN sent
    PinAuth,
    /// Accepting commands
    Ready,
    /// Teardown in progress
    Disconnecting,
    /// Link dropped
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::ChannelSetup => write!(f, "Channel Setup"),
            Self::Handshake => write!(f, "Handshake"),
            Self::PinAuth => write!(f, "PIN Authentication"),
            Self::Ready => write!(f, "Ready"),
            Self::Disconnecting => write!(f, "Disconnecting"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Bookkeeping for the single exchange in flight
struct PendingExchange<'a> {
    label: &'a str,
    attempts_left: u32,
    started: Instant,
}

impl<'a> PendingExchange<'a> {
    fn new(label: &'a str, attempts: u32) -> Self {
        Self {
            label,
            attempts_left: attempts.max(1),
            started: Instant::now(),
        }
    }

    /// Consume one attempt, returning whether another one is left
    fn consume(&mut self) -> bool {
        self.attempts_left = self.attempts_left.saturating_sub(1);
        self.attempts_left > 0
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    codec: FrameCodec,
    commands: Arc<CommandTable>,
    config: SessionConfig,
    channel_id: u32,
    state: RwLock<SessionState>,
    exchange: Mutex<Option<Reassembler>>,
    interrupt: Notify,
    keepalive_active: RwLock<bool>,
    keepalive_task: Mutex<Option<JoinHandle<()>>>,
}

/// Protocol session over one [`Transport`]
///
/// Cheap to clone; clones share the same channel, state and exchange lock.
/// Exactly one exchange is in flight at a time, foreground commands and the
/// keep-alive task queue on the same lock.
///
/// # Examples
///
/// ```no_run
/// use automower_ble::{CommandTable, Params, SessionConfig, SessionController, Transport};
/// use std::sync::Arc;
///
/// async fn battery(transport: Arc<dyn Transport>) -> automower_ble::Result<()> {
///     let commands = Arc::new(CommandTable::embedded()?);
///     let session = SessionController::new(transport, commands, SessionConfig::default());
///
///     session.connect().await?;
///     let level = session.command("batteryLevel", &Params::new()).await?;
///     println!("Battery: {:?}", level.value());
///     session.disconnect().await
/// }
/// ```
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("channel_id", &self.inner.channel_id)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Random non-zero channel id; channel 0 is reserved for the setup frame
#[must_use]
pub fn random_channel_id() -> u32 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).max(1)
}

impl SessionController {
    /// Create a session with the default checksum
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        commands: Arc<CommandTable>,
        config: SessionConfig,
    ) -> Self {
        Self::with_codec(transport, commands, config, FrameCodec::default())
    }

    /// Create a session with a custom frame codec
    #[must_use]
    pub fn with_codec(
        transport: Arc<dyn Transport>,
        commands: Arc<CommandTable>,
        config: SessionConfig,
        codec: FrameCodec,
    ) -> Self {
        let channel_id = config.channel_id.unwrap_or_else(random_channel_id);

        Self {
            inner: Arc::new(Inner {
                transport,
                codec,
                commands,
                config,
                channel_id,
                state: RwLock::new(SessionState::Idle),
                exchange: Mutex::new(None),
                interrupt: Notify::new(),
                keepalive_active: RwLock::new(false),
                keepalive_task: Mutex::new(None),
            }),
        }
    }

    /// Channel id bound to this session
    #[must_use]
    pub fn channel_id(&self) -> u32 {
        self.inner.channel_id
    }

    /// Session configuration
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Command table used to encode and decode
    #[must_use]
    pub fn commands(&self) -> &CommandTable {
        &self.inner.commands
    }

    /// MTU reported by the transport
    #[must_use]
    pub fn mtu(&self) -> usize {
        self.inner.transport.mtu()
    }

    /// Current session state
    pub async fn state(&self) -> SessionState {
        *self.inner.state.read().await
    }

    /// Check if the session accepts commands
    pub async fn is_ready(&self) -> bool {
        self.state().await == SessionState::Ready
    }

    /// Check if the keep-alive task is running
    pub async fn is_keepalive_active(&self) -> bool {
        *self.inner.keepalive_active.read().await
    }

    /// Connect the transport and run the channel setup sequence
    ///
    /// Setup frame, handshake frame, then the PIN if one is configured. The
    /// session is `Ready` and the keep-alive task running once this returns.
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::NotReady`] if the session is not idle, transport
    /// errors from connecting or subscribing, and [`MowerError::Timeout`] if a
    /// step of the sequence got no answer. On failure the session ends up
    /// `Disconnected`.
    pub async fn connect(&self) -> Result<()> {
        let state = self.state().await;
        if !matches!(state, SessionState::Idle | SessionState::Disconnected) {
            return Err(MowerError::NotReady {
                reason: format!("Cannot connect while {state}"),
            });
        }

        info!("Connecting on channel {:#010x}", self.inner.channel_id);
        match self.run_connect_sequence().await {
            Ok(()) => {
                self.set_state(SessionState::Ready).await;
                self.start_keepalive().await;
                info!("Session ready");
                Ok(())
            }
            Err(e) => {
                error!("Connect failed: {}", e);
                if let Err(teardown_err) = self.teardown().await {
                    warn!("Teardown after failed connect: {}", teardown_err);
                }
                Err(e)
            }
        }
    }

    async fn run_connect_sequence(&self) -> Result<()> {
        let transport = &self.inner.transport;
        let codec = &self.inner.codec;

        transport.connect().await?;
        let inbound = transport.subscribe().await?;
        *self.inner.exchange.lock().await = Some(Reassembler::new(inbound));

        tokio::time::sleep(self.inner.config.settle_delay()).await;

        self.set_state(SessionState::ChannelSetup).await;
        let reply = self
            .transact("channel setup", &codec.setup_channel_frame(self.inner.channel_id))
            .await?;
        if let Err(e) = codec.check_envelope(&reply) {
            warn!("Channel setup response failed validation: {}", e);
        }

        self.set_state(SessionState::Handshake).await;
        let reply = self
            .transact("handshake", &codec.handshake_frame(self.inner.channel_id))
            .await?;
        if let Err(e) = codec.check_envelope(&reply) {
            warn!("Handshake response failed validation: {}", e);
        }

        if let Some(pin) = self.inner.config.pin {
            self.set_state(SessionState::PinAuth).await;
            let descriptor = self.inner.commands.get(PIN_COMMAND)?;
            let params = Params::new().with("code", pin);
            match self.request(descriptor, &params).await {
                Ok(_) => info!("PIN accepted"),
                Err(MowerError::DeviceResult { code }) => {
                    warn!("PIN answered with {}, continuing", code);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Send a named command and decode its response
    ///
    /// # Errors
    ///
    /// - [`MowerError::UnknownCommand`] if the name is not in the table
    /// - [`MowerError::NotReady`] outside the `Ready` state
    /// - [`MowerError::MissingParameter`] / [`MowerError::Schema`] from encoding
    /// - [`MowerError::DeviceResult`] for a non-OK result code
    /// - [`MowerError::Timeout`] after all attempts, or a transport error; the
    ///   session is torn down in both cases
    /// - [`MowerError::LengthMismatch`] if the payload does not match the schema
    pub async fn command(&self, name: &str, params: &Params) -> Result<Response> {
        let descriptor = self.inner.commands.get(name)?;
        self.ensure_ready().await?;

        match self.request(descriptor, params).await {
            Err(e) if e.is_connection_error() => {
                if !self.is_closing().await {
                    if let Err(teardown_err) = self.teardown().await {
                        warn!("Teardown after {}: {}", e, teardown_err);
                    }
                }
                Err(e)
            }
            other => other,
        }
    }

    /// Send one keep-alive
    ///
    /// Failures leave the session untouched.
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::NotReady`] outside the `Ready` state, or the
    /// exchange error.
    pub async fn send_keepalive(&self) -> Result<()> {
        let descriptor = self.inner.commands.get(KEEPALIVE_COMMAND)?;
        self.ensure_ready().await?;
        self.request(descriptor, &Params::new()).await.map(|_| ())
    }

    /// Abort the current wait for a response
    ///
    /// The interrupted attempt counts as timed out and the request is re-sent
    /// while attempts remain.
    pub fn interrupt(&self) {
        self.inner.interrupt.notify_waiters();
    }

    /// Stop the keep-alive task, stop notifications and drop the link
    ///
    /// # Errors
    ///
    /// Returns the first transport error; the session is `Disconnected`
    /// regardless.
    pub async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting session");
        self.teardown().await
    }

    async fn ensure_ready(&self) -> Result<()> {
        let state = self.state().await;
        if state == SessionState::Ready {
            Ok(())
        } else {
            Err(MowerError::NotReady {
                reason: format!("Session is {state}"),
            })
        }
    }

    async fn is_closing(&self) -> bool {
        matches!(
            self.state().await,
            SessionState::Disconnecting | SessionState::Disconnected
        )
    }

    async fn set_state(&self, state: SessionState) {
        debug!("Session state -> {}", state);
        *self.inner.state.write().await = state;
    }

    /// Encode, exchange, validate and decode one command
    async fn request(&self, descriptor: &CommandDescriptor, params: &Params) -> Result<Response> {
        let payload = descriptor.encode_request_fields(params)?;
        let frame = self.inner.codec.encode_request(
            self.inner.channel_id,
            descriptor.major(),
            descriptor.minor(),
            &payload,
        )?;

        let reply = self.transact(descriptor.name(), &frame).await?;

        if let Some(code) = result_code(&reply).filter(|code| *code != ResultCode::Ok) {
            warn!("{} rejected by device: {}", descriptor.name(), code);
            return Err(MowerError::DeviceResult { code });
        }
        if let Err(e) = self.inner.codec.check_response(
            &reply,
            self.inner.channel_id,
            descriptor.major(),
            descriptor.minor(),
        ) {
            warn!("Response to {} failed validation: {}", descriptor.name(), e);
        }

        descriptor.decode_response_fields(payload_slice(&reply))
    }

    /// Write a frame and wait for one complete reply, retrying on timeout
    async fn transact(&self, label: &str, frame: &[u8]) -> Result<Bytes> {
        let config = &self.inner.config;
        let mut guard = self.inner.exchange.lock().await;
        let reassembler = guard.as_mut().ok_or(MowerError::Disconnected)?;
        let mut pending = PendingExchange::new(label, config.attempts);

        loop {
            if self.is_closing().await {
                return Err(MowerError::Disconnected);
            }

            reassembler.drain_stale();
            write_frame(self.inner.transport.as_ref(), frame).await?;

            match reassembler
                .next_frame(
                    config.first_chunk_timeout(),
                    config.continuation_timeout(),
                    &self.inner.interrupt,
                )
                .await
            {
                Ok(reply) => {
                    debug!(
                        "{} answered after {:?}: {:02x?}",
                        pending.label,
                        pending.started.elapsed(),
                        reply.as_ref()
                    );
                    return Ok(reply);
                }
                Err(WaitError::Closed) => {
                    error!("Notification channel closed during {}", pending.label);
                    return Err(MowerError::Disconnected);
                }
                Err(reason) => {
                    if !pending.consume() {
                        error!(
                            "No response to {} after {} attempts",
                            pending.label, config.attempts
                        );
                        return Err(MowerError::Timeout {
                            attempts: config.attempts.max(1),
                        });
                    }
                    warn!(
                        "No response to {} ({:?}), {} attempts left",
                        pending.label, reason, pending.attempts_left
                    );
                }
            }
        }
    }

    async fn start_keepalive(&self) {
        *self.inner.keepalive_active.write().await = true;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let interval = self.inner.config.keepalive_interval();

        let handle = tokio::spawn(async move {
            info!("Keep-alive started");

            loop {
                tokio::time::sleep(interval).await;

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let session = SessionController { inner };

                if !session.is_keepalive_active().await || !session.is_ready().await {
                    break;
                }
                if let Err(e) = session.send_keepalive().await {
                    warn!("Keep-alive failed: {}", e);
                }
            }

            info!("Keep-alive stopped");
        });

        *self.inner.keepalive_task.lock().await = Some(handle);
    }

    async fn stop_keepalive(&self) {
        *self.inner.keepalive_active.write().await = false;

        let handle = self.inner.keepalive_task.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }

    async fn teardown(&self) -> Result<()> {
        self.set_state(SessionState::Disconnecting).await;
        self.stop_keepalive().await;
        self.interrupt();

        self.inner.exchange.lock().await.take();

        let transport = &self.inner.transport;
        let stopped = transport.stop_notifications().await;
        if let Err(e) = &stopped {
            warn!("Failed to stop notifications: {}", e);
        }
        let dropped = transport.disconnect().await;
        if let Err(e) = &dropped {
            warn!("Failed to disconnect: {}", e);
        }

        self.set_state(SessionState::Disconnected).await;
        info!("Session disconnected");
        stopped.and(dropped)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.keepalive_task.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::FieldValue,
        testutil::{hex, DeviceSim, MockTransport},
    };
    use std::time::Duration;

    const CHANNEL: u32 = 1_197_489_078;

    fn config() -> SessionConfig {
        SessionConfig {
            channel_id: Some(CHANNEL),
            ..SessionConfig::default()
        }
    }

    fn session(transport: &MockTransport, config: SessionConfig) -> SessionController {
        let commands = Arc::new(CommandTable::embedded().unwrap());
        SessionController::new(Arc::new(transport.clone()), commands, config)
    }

    fn device() -> DeviceSim {
        DeviceSim::new()
            .reply(4106, 20, &[87])
            .reply(4106, 21, &[1])
            .reply(4698, 9, &[0x17, 0x01])
            .reply(4674, 2, &[])
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_sequence() {
        let transport = MockTransport::with_device(20, device());
        let session = session(&transport, config());

        session.connect().await.unwrap();

        assert_eq!(session.state().await, SessionState::Ready);
        assert!(session.is_keepalive_active().await);

        let frames = transport.frames();
        let codec = FrameCodec::default();
        assert_eq!(frames[0], codec.setup_channel_frame(CHANNEL).to_vec());
        assert_eq!(frames[1], codec.handshake_frame(CHANNEL).to_vec());
        assert!(transport.writes().iter().all(|chunk| chunk.len() <= 17));

        session.disconnect().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_pin() {
        let transport = MockTransport::with_device(
            20,
            device().reply_with(4664, 4, ResultCode::InvalidPin, &[]),
        );
        let session = session(
            &transport,
            SessionConfig {
                channel_id: Some(1_739_453_030),
                pin: Some(7201),
                ..SessionConfig::default()
            },
        );

        session.connect().await.unwrap();

        assert_eq!(session.state().await, SessionState::Ready);
        assert_eq!(
            transport.frames()[2],
            hex("02fd120066f2ad6701ad00af381204000200211c7d03")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_fails_without_setup_response() {
        let transport = MockTransport::with_device(20, device().silent_setup());
        let session = session(&transport, config());

        let started = tokio::time::Instant::now();
        let result = session.connect().await;

        assert!(matches!(result, Err(MowerError::Timeout { attempts: 5 })));
        assert_eq!(session.state().await, SessionState::Disconnected);
        assert_eq!(transport.frames().len(), 5);
        assert_eq!(transport.disconnect_calls(), 1);
        assert!(started.elapsed() <= Duration::from_secs(5 + 5 * 10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_transport_failure() {
        let transport = MockTransport::with_device(20, device());
        transport.fail_connect();
        let session = session(&transport, config());

        assert!(matches!(
            session.connect().await,
            Err(MowerError::ConnectionFailed(_))
        ));
        assert_eq!(session.state().await, SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_decodes_response() {
        let transport = MockTransport::with_device(20, device());
        let session = session(&transport, config());
        session.connect().await.unwrap();

        let charging = session.command("isCharging", &Params::new()).await.unwrap();
        assert_eq!(charging.value(), Some(&FieldValue::Bool(true)));

        let device_type = session.command("deviceType", &Params::new()).await.unwrap();
        assert_eq!(device_type.field("deviceType"), Some(&FieldValue::U8(0x17)));
        assert_eq!(device_type.field("deviceSubType"), Some(&FieldValue::U8(0x01)));

        assert_eq!(
            transport.frames()[2],
            FrameCodec::default()
                .encode_request(CHANNEL, 4106, 21, &[])
                .unwrap()
                .to_vec()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_before_connect() {
        let transport = MockTransport::with_device(20, device());
        let session = session(&transport, config());

        let result = session.command("batteryLevel", &Params::new()).await;
        assert!(matches!(result, Err(MowerError::NotReady { .. })));
        assert!(transport.frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_command() {
        let transport = MockTransport::with_device(20, device());
        let session = session(&transport, config());
        session.connect().await.unwrap();

        let result = session.command("selfDestruct", &Params::new()).await;
        assert!(matches!(result, Err(MowerError::UnknownCommand(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_tears_down() {
        let transport = MockTransport::with_device(20, device());
        let session = session(&transport, config());
        session.connect().await.unwrap();

        let started = tokio::time::Instant::now();
        let result = session.command("remainingChargeTime", &Params::new()).await;

        assert!(matches!(result, Err(MowerError::Timeout { attempts: 5 })));
        assert_eq!(transport.requests_for(4106, 22), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(50));
        assert_eq!(session.state().await, SessionState::Disconnected);
        assert!(!session.is_keepalive_active().await);
        assert_eq!(transport.stop_calls(), 1);
        assert_eq!(transport.disconnect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_result_is_not_retried() {
        let transport = MockTransport::with_device(
            20,
            device().reply_with(4658, 5, ResultCode::NotAllowed, &[]),
        );
        let session = session(&transport, config());
        session.connect().await.unwrap();

        let result = session.command("park", &Params::new()).await;

        assert!(matches!(
            result,
            Err(MowerError::DeviceResult {
                code: ResultCode::NotAllowed
            })
        ));
        assert_eq!(transport.requests_for(4658, 5), 1);
        assert_eq!(session.state().await, SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_validation_still_decodes() {
        // Device answers with the wrong minor opcode
        let transport = MockTransport::with_device(20, device());
        let session = session(&transport, config());
        session.connect().await.unwrap();

        let reply = FrameCodec::default()
            .encode_response(CHANNEL + 1, 4586, 9, ResultCode::Ok, &[3])
            .unwrap();
        let inject = transport.clone();
        let waiter = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            inject.inject(&reply);
        });

        let state = session.command("mowerState", &Params::new()).await.unwrap();
        waiter.await.unwrap();
        assert_eq!(state.value(), Some(&FieldValue::U8(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_bytes_are_discarded() {
        let transport = MockTransport::with_device(20, device());
        let session = session(&transport, config());
        session.connect().await.unwrap();

        // Leftover of an abandoned exchange announcing a long frame
        transport.inject(&hex("02fd2000b63b6047"));

        let level = session.command("batteryLevel", &Params::new()).await.unwrap();
        assert_eq!(level.value(), Some(&FieldValue::U8(87)));
        assert_eq!(transport.requests_for(4106, 20), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_parameter() {
        let transport = MockTransport::with_device(20, device());
        let session = session(&transport, config());
        session.connect().await.unwrap();

        let result = session.command("SetMode", &Params::new()).await;
        assert!(matches!(
            result,
            Err(MowerError::MissingParameter { ref field, .. }) if field == "mode"
        ));
        assert_eq!(session.state().await, SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_runs_on_interval() {
        let transport = MockTransport::with_device(20, device());
        let session = session(&transport, config());
        session.connect().await.unwrap();

        tokio::time::sleep(Duration::from_millis(45_500)).await;
        assert_eq!(transport.requests_for(4674, 2), 3);

        session.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.requests_for(4674, 2), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_failure_keeps_session() {
        let transport = MockTransport::with_device(
            20,
            DeviceSim::new().reply(4106, 20, &[50]),
        );
        let session = session(
            &transport,
            SessionConfig {
                attempts: 1,
                ..config()
            },
        );
        session.connect().await.unwrap();

        // Keep-alive fires 15 s after connect and gives up 10 s later
        tokio::time::sleep(Duration::from_secs(26)).await;
        assert_eq!(transport.requests_for(4674, 2), 1);
        assert_eq!(session.state().await, SessionState::Ready);
        assert_eq!(transport.disconnect_calls(), 0);

        let level = session.command("batteryLevel", &Params::new()).await.unwrap();
        assert_eq!(level.value(), Some(&FieldValue::U8(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_commands_are_serialized() {
        let transport = MockTransport::with_device(20, device());
        let first = session(&transport, config());
        let second = first.clone();
        first.connect().await.unwrap();

        let params = Params::new();
        let (level, charging) = tokio::join!(
            first.command("batteryLevel", &params),
            second.command("isCharging", &params)
        );

        assert_eq!(level.unwrap().value(), Some(&FieldValue::U8(87)));
        assert_eq!(charging.unwrap().value(), Some(&FieldValue::Bool(true)));
        assert_eq!(transport.requests_for(4106, 20), 1);
        assert_eq!(transport.requests_for(4106, 21), 1);

        first.disconnect().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_waits_for_keepalive_exchange() {
        let transport = MockTransport::with_device(20, DeviceSim::new().reply(4106, 20, &[42]));
        let session = session(
            &transport,
            SessionConfig {
                attempts: 1,
                ..config()
            },
        );
        session.connect().await.unwrap();

        // Keep-alive goes out at 15 s and holds the exchange until 25 s
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(transport.requests_for(4674, 2), 1);

        let started = tokio::time::Instant::now();
        let level = session.command("batteryLevel", &Params::new()).await.unwrap();
        assert_eq!(level.value(), Some(&FieldValue::U8(42)));
        assert!(started.elapsed() >= Duration::from_secs(9));

        let opcodes: Vec<(u8, u8)> = transport
            .frames()
            .iter()
            .filter(|f| f.len() > 14 && f[11] == crate::protocol::COMMAND_MARKER)
            .map(|f| (f[12], f[14]))
            .collect();
        assert_eq!(opcodes, vec![(0x42, 2), (0x0A, 20)]);
        assert_eq!(session.state().await, SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_counts_as_attempt() {
        let transport = MockTransport::with_device(20, device());
        let session = session(
            &transport,
            SessionConfig {
                attempts: 2,
                ..config()
            },
        );
        session.connect().await.unwrap();

        let interrupter = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            interrupter.interrupt();
        });

        let started = tokio::time::Instant::now();
        let result = session.command("errorCode", &Params::new()).await;

        assert!(matches!(result, Err(MowerError::Timeout { attempts: 2 })));
        assert_eq!(transport.requests_for(4586, 6), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_propagates() {
        let transport = MockTransport::with_device(20, device());
        let session = session(&transport, config());
        session.connect().await.unwrap();

        transport.fail_writes();
        let result = session.command("batteryLevel", &Params::new()).await;
        assert!(matches!(result, Err(MowerError::Disconnected)));
        assert_eq!(session.state().await, SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_disconnect() {
        let transport = MockTransport::with_device(20, device());
        let session = session(&transport, config());

        session.connect().await.unwrap();
        assert!(matches!(
            session.connect().await,
            Err(MowerError::NotReady { .. })
        ));

        session.disconnect().await.unwrap();
        session.connect().await.unwrap();
        assert!(session.is_ready().await);
    }

    #[test]
    fn test_random_channel_id_nonzero() {
        for _ in 0..100 {
            assert_ne!(random_channel_id(), 0);
        }
    }
}
