//! Test helpers: hex fixtures and an in-memory transport with a scripted device.

use crate::{
    error::{MowerError, Result},
    protocol::{frame_len, FrameCodec, ResultCode, COMMAND_MARKER, PacketType},
    transport::{chunk_size, Transport},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc;

/// Decode a hex fixture
pub(crate) fn hex(text: &str) -> Vec<u8> {
    assert!(text.len() % 2 == 0, "odd hex length");
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).unwrap())
        .collect()
}

/// Scripted replies keyed on opcode
#[derive(Debug, Clone, Default)]
pub(crate) struct DeviceSim {
    replies: HashMap<(u16, u8), (ResultCode, Vec<u8>)>,
    silent_setup: bool,
}

impl DeviceSim {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer `(major, minor)` with OK and `payload`
    pub(crate) fn reply(self, major: u16, minor: u8, payload: &[u8]) -> Self {
        self.reply_with(major, minor, ResultCode::Ok, payload)
    }

    /// Answer `(major, minor)` with an explicit result code
    pub(crate) fn reply_with(mut self, major: u16, minor: u8, code: ResultCode, payload: &[u8]) -> Self {
        self.replies.insert((major, minor), (code, payload.to_vec()));
        self
    }

    /// Never answer the channel setup frame
    pub(crate) fn silent_setup(mut self) -> Self {
        self.silent_setup = true;
        self
    }

    /// Frames to send back for one complete written frame
    fn respond(&self, frame: &[u8]) -> Option<Bytes> {
        let codec = FrameCodec::default();
        let channel = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);

        if frame.len() > 11 && frame[10] == PacketType::Request as u8 && frame[11] == COMMAND_MARKER {
            let major = u16::from_le_bytes([frame[12], frame[13]]);
            let minor = frame[14];
            let (code, payload) = self.replies.get(&(major, minor))?;
            return codec.encode_response(channel, major, minor, *code, payload).ok();
        }

        if frame.len() > 10 && frame[10] == 0x14 {
            if self.silent_setup {
                return None;
            }
            let announced = u32::from_le_bytes([frame[11], frame[12], frame[13], frame[14]]);
            return Some(codec.handshake_frame(announced));
        }

        Some(codec.handshake_frame(channel))
    }
}

#[derive(Default)]
struct MockState {
    writes: Vec<Vec<u8>>,
    pending: Vec<u8>,
    frames: Vec<Vec<u8>>,
    sender: Option<mpsc::UnboundedSender<Bytes>>,
    device: Option<DeviceSim>,
    connected: bool,
    fail_connect: bool,
    fail_writes: bool,
    stop_calls: usize,
    disconnect_calls: usize,
}

/// In-memory [`Transport`] recording every write
///
/// With a [`DeviceSim`] attached, each complete written frame is answered
/// with MTU-sized notification chunks.
#[derive(Clone)]
pub(crate) struct MockTransport {
    mtu: usize,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub(crate) fn new(mtu: usize) -> Self {
        Self {
            mtu,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub(crate) fn with_device(mtu: usize, device: DeviceSim) -> Self {
        let transport = Self::new(mtu);
        transport.state.lock().unwrap().device = Some(device);
        transport
    }

    pub(crate) fn fail_connect(&self) {
        self.state.lock().unwrap().fail_connect = true;
    }

    pub(crate) fn fail_writes(&self) {
        self.state.lock().unwrap().fail_writes = true;
    }

    /// Raw chunks in write order
    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Complete frames reassembled from the written chunks
    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().frames.clone()
    }

    /// Complete command frames carrying the given opcode
    pub(crate) fn requests_for(&self, major: u16, minor: u8) -> usize {
        self.frames()
            .iter()
            .filter(|f| {
                f.len() > 14
                    && f[11] == COMMAND_MARKER
                    && u16::from_le_bytes([f[12], f[13]]) == major
                    && f[14] == minor
            })
            .count()
    }

    /// Push an unsolicited chunk to the subscriber
    pub(crate) fn inject(&self, chunk: &[u8]) {
        if let Some(sender) = &self.state.lock().unwrap().sender {
            let _ = sender.send(Bytes::copy_from_slice(chunk));
        }
    }

    pub(crate) fn stop_calls(&self) -> usize {
        self.state.lock().unwrap().stop_calls
    }

    pub(crate) fn disconnect_calls(&self) -> usize {
        self.state.lock().unwrap().disconnect_calls
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_connect {
            return Err(MowerError::ConnectionFailed("mock refused".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Bytes>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().sender = Some(tx);
        Ok(rx)
    }

    async fn write_chunk(&self, chunk: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(MowerError::Disconnected);
        }
        state.writes.push(chunk.to_vec());
        state.pending.extend_from_slice(chunk);

        let Some(len) = frame_len(&state.pending) else {
            return Ok(());
        };
        if state.pending.len() < len {
            return Ok(());
        }

        let frame: Vec<u8> = state.pending.drain(..len).collect();
        state.frames.push(frame.clone());

        let reply = state.device.as_ref().and_then(|device| device.respond(&frame));
        if let (Some(reply), Some(sender)) = (reply, &state.sender) {
            for piece in reply.chunks(chunk_size(self.mtu)) {
                let _ = sender.send(Bytes::copy_from_slice(piece));
            }
        }
        Ok(())
    }

    async fn stop_notifications(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.stop_calls += 1;
        state.sender = None;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.disconnect_calls += 1;
        state.connected = false;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn mtu(&self) -> usize {
        self.mtu
    }
}
