use crate::{
    ble::BleManager,
    error::{MowerError, Result},
    models::{lookup_or_unknown, MowerModel},
    schema::{CommandTable, FieldValue, Params, Response, ResponseFields},
    session::SessionController,
    types::{
        ConnectionParams, ModeOfOperation, MowerActivity, MowerMessage, MowerState,
        RestrictionReason, SessionConfig, Statistics, Task,
    },
};
use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::sync::RwLock;
use tracing::info;

/// Override length used by [`Mower::override_mow`] when none is given
pub const DEFAULT_OVERRIDE: Duration = Duration::from_secs(3 * 60 * 60);

/// Raw `SetMode` value the firmware expects ahead of a schedule override
const OVERRIDE_SET_MODE: u8 = 0;

/// Typed interface to one mower
///
/// Wraps a [`SessionController`] and translates named commands into domain
/// types. The model is fetched once and cached, since the state numbering
/// depends on the brand.
///
/// # Examples
///
/// ```no_run
/// use automower_ble::{ConnectionParams, Mower, SessionConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = SessionConfig {
///         pin: Some(1234),
///         ..Default::default()
///     };
///     let mower = Mower::connect_address(
///         "C8:DF:84:12:34:56",
///         &ConnectionParams::default(),
///         config,
///     )
///     .await?;
///
///     println!("Model: {}", mower.get_model().await?);
///     println!("Battery: {}%", mower.battery_level().await?);
///     println!("State: {}", mower.mower_state().await?);
///
///     mower.disconnect().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Mower {
    session: SessionController,
    model: RwLock<Option<MowerModel>>,
}

impl Mower {
    /// Wrap an existing session
    #[must_use]
    pub fn new(session: SessionController) -> Self {
        Self {
            session,
            model: RwLock::new(None),
        }
    }

    /// Find the mower at `address`, connect and open a session with the embedded schema
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::DeviceNotFound`] if the address does not show up,
    /// or any connect error from the session.
    pub async fn connect_address(
        address: &str,
        params: &ConnectionParams,
        config: SessionConfig,
    ) -> Result<Self> {
        let manager = BleManager::new().await?;
        let transport = manager.connect_transport(address, params).await?;
        let commands = Arc::new(CommandTable::embedded()?);

        let mower = Self::new(SessionController::new(Arc::new(transport), commands, config));
        mower.connect().await?;
        Ok(mower)
    }

    /// Underlying session
    #[must_use]
    pub const fn session(&self) -> &SessionController {
        &self.session
    }

    /// Run the connect sequence
    ///
    /// # Errors
    ///
    /// See [`SessionController::connect`].
    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    /// Close the session
    ///
    /// # Errors
    ///
    /// See [`SessionController::disconnect`].
    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }

    /// Check if the session accepts commands
    pub async fn is_connected(&self) -> bool {
        self.session.is_ready().await
    }

    /// Send a raw named command
    ///
    /// # Errors
    ///
    /// See [`SessionController::command`].
    pub async fn command(&self, name: &str, params: &Params) -> Result<Response> {
        self.session.command(name, params).await
    }

    async fn query(&self, name: &str) -> Result<FieldValue> {
        single(name, self.command(name, &Params::new()).await?)
    }

    async fn query_fields(&self, name: &str, params: &Params) -> Result<ResponseFields> {
        let response = self.command(name, params).await?;
        response.into_fields().ok_or_else(|| shape_error(name, "a field map"))
    }

    async fn action(&self, name: &str, params: &Params) -> Result<()> {
        self.command(name, params).await.map(|_| ())
    }

    /// Model of the connected mower, fetched once per [`Mower`]
    ///
    /// # Errors
    ///
    /// Returns session errors, or [`MowerError::Schema`] if the response does
    /// not carry the device type fields.
    pub async fn get_model(&self) -> Result<MowerModel> {
        if let Some(model) = *self.model.read().await {
            return Ok(model);
        }

        let fields = self.query_fields("deviceType", &Params::new()).await?;
        let model = lookup_or_unknown(
            field_number("deviceType", &fields, "deviceType")?,
            field_number("deviceType", &fields, "deviceSubType")?,
        );
        info!("Connected to {}", model);

        *self.model.write().await = Some(model);
        Ok(model)
    }

    /// Battery level in percent
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn battery_level(&self) -> Result<u8> {
        number("batteryLevel", &self.query("batteryLevel").await?)
    }

    /// Whether the mower is charging
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn is_charging(&self) -> Result<bool> {
        boolean("isCharging", &self.query("isCharging").await?)
    }

    /// Remaining charge time as reported by the mower
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn remaining_charge_time(&self) -> Result<u32> {
        number("remainingChargeTime", &self.query("remainingChargeTime").await?)
    }

    /// Current operational state, decoded for the mower's brand
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn mower_state(&self) -> Result<MowerState> {
        let model = self.get_model().await?;
        let raw = number("mowerState", &self.query("mowerState").await?)?;
        Ok(MowerState::from_raw(raw, model.is_husqvarna()))
    }

    /// Current activity
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn mower_activity(&self) -> Result<MowerActivity> {
        let raw: u8 = number("mowerActivity", &self.query("mowerActivity").await?)?;
        Ok(MowerActivity::from(raw))
    }

    /// Current mode of operation
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn mode_of_operation(&self) -> Result<ModeOfOperation> {
        let raw: u8 = number("modeOfOperation", &self.query("modeOfOperation").await?)?;
        Ok(ModeOfOperation::from(raw))
    }

    /// Change the mode of operation
    ///
    /// # Errors
    ///
    /// Returns session errors, or [`MowerError::DeviceResult`] if refused.
    pub async fn set_mode_of_operation(&self, mode: ModeOfOperation) -> Result<()> {
        info!("Setting mode of operation to {}", mode);
        self.action("SetMode", &Params::new().with("mode", u8::from(mode)))
            .await
    }

    /// Mow for `duration`, ignoring the schedule
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::Encoding`] if the duration exceeds `u32::MAX`
    /// seconds, or session errors.
    pub async fn set_override_duration(&self, duration: Duration) -> Result<()> {
        let seconds = u32::try_from(duration.as_secs())
            .map_err(|_| MowerError::Encoding(format!("Override of {duration:?} is too long")))?;
        info!("Overriding schedule for {} s", seconds);
        self.action("overrideDuration", &Params::new().with("duration", seconds))
            .await
    }

    /// Switch to manual operation and start mowing for `duration`
    ///
    /// Sends `SetMode` with the raw mode byte `0` the firmware accepts for an
    /// override, then the override duration.
    ///
    /// # Errors
    ///
    /// Returns the first failing step.
    pub async fn override_mow(&self, duration: Duration) -> Result<()> {
        info!("Switching to manual override");
        self.action("SetMode", &Params::new().with("mode", OVERRIDE_SET_MODE))
            .await?;
        self.set_override_duration(duration).await
    }

    /// Pause the mower
    ///
    /// # Errors
    ///
    /// Returns session errors, or [`MowerError::DeviceResult`] if refused.
    pub async fn pause(&self) -> Result<()> {
        info!("Pausing mower");
        self.action("pause", &Params::new()).await
    }

    /// Resume after a pause
    ///
    /// # Errors
    ///
    /// Returns session errors, or [`MowerError::DeviceResult`] if refused.
    pub async fn resume(&self) -> Result<()> {
        info!("Resuming mower");
        self.action("resume", &Params::new()).await
    }

    /// Send the mower back to its station
    ///
    /// # Errors
    ///
    /// Returns session errors, or [`MowerError::DeviceResult`] if refused.
    pub async fn park(&self) -> Result<()> {
        info!("Parking mower");
        self.action("park", &Params::new()).await
    }

    /// Trigger a start, as pressing start on the mower would
    ///
    /// # Errors
    ///
    /// Returns session errors, or [`MowerError::DeviceResult`] if refused.
    pub async fn start_trigger(&self) -> Result<()> {
        self.action("StartTrigger", &Params::new()).await
    }

    /// Next scheduled start; `None` when nothing is planned
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn next_start_time(&self) -> Result<Option<SystemTime>> {
        let seconds: u32 = number("GetNextStartTime", &self.query("GetNextStartTime").await?)?;
        Ok((seconds != 0).then(|| UNIX_EPOCH + Duration::from_secs(u64::from(seconds))))
    }

    /// Why the mower is currently restricted
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn restriction_reason(&self) -> Result<RestrictionReason> {
        let raw: u8 = number("GetRestrictionReason", &self.query("GetRestrictionReason").await?)?;
        Ok(RestrictionReason::from(raw))
    }

    /// Current error code, `0` when none
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn error_code(&self) -> Result<u16> {
        number("errorCode", &self.query("errorCode").await?)
    }

    /// Serial number
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn serial_number(&self) -> Result<u32> {
        number("GetSerialNumber", &self.query("GetSerialNumber").await?)
    }

    /// Name given to the mower by its owner
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn mower_name(&self) -> Result<String> {
        const COMMAND: &str = "GetUserMowerNameAsAsciiString";
        match self.query(COMMAND).await? {
            FieldValue::Ascii(name) => Ok(name),
            _ => Err(shape_error(COMMAND, "an ascii value")),
        }
    }

    /// Lifetime statistics
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn statistics(&self) -> Result<Statistics> {
        const COMMAND: &str = "GetAllStatistics";
        let fields = self.query_fields(COMMAND, &Params::new()).await?;

        Ok(Statistics {
            total_running_time: field_number(COMMAND, &fields, "totalRunningTime")?,
            total_cutting_time: field_number(COMMAND, &fields, "totalCuttingTime")?,
            total_charging_time: field_number(COMMAND, &fields, "totalChargingTime")?,
            total_searching_time: field_number(COMMAND, &fields, "totalSearchingTime")?,
            number_of_collisions: field_number(COMMAND, &fields, "numberOfCollisions")?,
            number_of_charging_cycles: field_number(COMMAND, &fields, "numberOfChargingCycles")?,
        })
    }

    /// Entry `index` of the message log, newest first
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn message(&self, index: u32) -> Result<MowerMessage> {
        const COMMAND: &str = "GetMessage";
        let fields = self
            .query_fields(COMMAND, &Params::new().with("messageId", index))
            .await?;

        Ok(MowerMessage {
            time: field_number(COMMAND, &fields, "time")?,
            code: field_number(COMMAND, &fields, "code")?,
            severity: field_number(COMMAND, &fields, "severity")?,
            ack_state: field_number(COMMAND, &fields, "ackState")?,
        })
    }

    /// Most recent message log entry
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn last_message(&self) -> Result<MowerMessage> {
        self.message(0).await
    }

    /// Number of schedule entries
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn number_of_tasks(&self) -> Result<u32> {
        number("GetNumberOfTasks", &self.query("GetNumberOfTasks").await?)
    }

    /// Schedule entry `task_id`
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn get_task(&self, task_id: u32) -> Result<Task> {
        const COMMAND: &str = "GetTask";
        const DAYS: [&str; 7] = [
            "useOnMonday",
            "useOnTuesday",
            "useOnWednesday",
            "useOnThursday",
            "useOnFriday",
            "useOnSaturday",
            "useOnSunday",
        ];

        let fields = self
            .query_fields(COMMAND, &Params::new().with("taskId", task_id))
            .await?;

        let mut days = [false; 7];
        for (day, name) in days.iter_mut().zip(DAYS) {
            *day = field_bool(COMMAND, &fields, name)?;
        }

        Ok(Task {
            start: field_number(COMMAND, &fields, "start")?,
            duration: field_number(COMMAND, &fields, "duration")?,
            days,
        })
    }

    /// Whether an operator is logged in on the mower
    ///
    /// # Errors
    ///
    /// Returns session or decoding errors.
    pub async fn is_operator_logged_in(&self) -> Result<bool> {
        boolean("IsOperatorLoggedIn", &self.query("IsOperatorLoggedIn").await?)
    }

    /// Send one keep-alive outside the background schedule
    ///
    /// # Errors
    ///
    /// See [`SessionController::send_keepalive`].
    pub async fn send_keepalive(&self) -> Result<()> {
        self.session.send_keepalive().await
    }
}

fn shape_error(command: &str, expected: &str) -> MowerError {
    MowerError::Schema(format!("Response to {command} is not {expected}"))
}

fn single(command: &str, response: Response) -> Result<FieldValue> {
    match response {
        Response::Value(value) => Ok(value),
        _ => Err(shape_error(command, "a single value")),
    }
}

fn number<T: TryFrom<u64>>(command: &str, value: &FieldValue) -> Result<T> {
    value
        .as_u64()
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| MowerError::Schema(format!("Unexpected value {value} in response to {command}")))
}

fn boolean(command: &str, value: &FieldValue) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| MowerError::Schema(format!("Unexpected value {value} in response to {command}")))
}

fn field<'a>(command: &str, fields: &'a ResponseFields, name: &str) -> Result<&'a FieldValue> {
    fields
        .get(name)
        .ok_or_else(|| MowerError::Schema(format!("Response to {command} lacks field '{name}'")))
}

fn field_number<T: TryFrom<u64>>(command: &str, fields: &ResponseFields, name: &str) -> Result<T> {
    number(command, field(command, fields, name)?)
}

fn field_bool(command: &str, fields: &ResponseFields, name: &str) -> Result<bool> {
    boolean(command, field(command, fields, name)?)
}
