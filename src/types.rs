use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Operational state reported by `mowerState`
///
/// Husqvarna-branded and third-party firmware number the states differently,
/// see [`MowerState::from_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MowerState {
    /// Switched off
    Off,
    /// Waiting for the PIN to be entered on the mower
    WaitForSafetyPin,
    /// Stopped, manual action required
    Stopped,
    /// Unrecoverable error
    FatalError,
    /// About to start
    PendingStart,
    /// Paused by the user
    Paused,
    /// Operating
    InOperation,
    /// Restricted by schedule or override
    Restricted,
    /// Recoverable error
    Error,
    /// Running safety checks
    CheckSafety,
    /// Connecting
    Connecting,
    /// Pending
    Pending,
    /// Disconnected
    Disconnected,
    /// Code not known to this library
    Unknown(u8),
}

impl MowerState {
    /// Decode a raw state byte for the given firmware family
    #[must_use]
    pub const fn from_raw(value: u8, is_husqvarna: bool) -> Self {
        if is_husqvarna {
            match value {
                1 => Self::Paused,
                2 => Self::Stopped,
                3 => Self::Error,
                4 => Self::FatalError,
                5 => Self::Off,
                6 => Self::CheckSafety,
                7 => Self::PendingStart,
                8 => Self::WaitForSafetyPin,
                9 => Self::Restricted,
                10 => Self::InOperation,
                12 => Self::Connecting,
                13 => Self::Pending,
                14 => Self::Disconnected,
                other => Self::Unknown(other),
            }
        } else {
            match value {
                0 => Self::Off,
                1 => Self::WaitForSafetyPin,
                2 => Self::Stopped,
                3 => Self::FatalError,
                4 => Self::PendingStart,
                5 => Self::Paused,
                6 => Self::InOperation,
                7 => Self::Restricted,
                8 => Self::Error,
                other => Self::Unknown(other),
            }
        }
    }
}

impl fmt::Display for MowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::WaitForSafetyPin => write!(f, "waitForSafetyPin"),
            Self::Stopped => write!(f, "stopped"),
            Self::FatalError => write!(f, "fatalError"),
            Self::PendingStart => write!(f, "pendingStart"),
            Self::Paused => write!(f, "paused"),
            Self::InOperation => write!(f, "inOperation"),
            Self::Restricted => write!(f, "restricted"),
            Self::Error => write!(f, "error"),
            Self::CheckSafety => write!(f, "checkSafety"),
            Self::Connecting => write!(f, "connecting"),
            Self::Pending => write!(f, "pending"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// What the mower is currently doing, reported by `mowerActivity`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MowerActivity {
    /// No activity
    None,
    /// Charging in the station
    Charging,
    /// Leaving the station
    GoingOut,
    /// Mowing
    Mowing,
    /// Returning to the station
    GoingHome,
    /// Parked in the station
    Parked,
    /// Stopped somewhere in the garden
    StoppedInGarden,
    /// Code not known to this library
    Unknown(u8),
}

impl From<u8> for MowerActivity {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Charging,
            2 => Self::GoingOut,
            3 => Self::Mowing,
            4 => Self::GoingHome,
            5 => Self::Parked,
            6 => Self::StoppedInGarden,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for MowerActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Charging => write!(f, "charging"),
            Self::GoingOut => write!(f, "goingOut"),
            Self::Mowing => write!(f, "mowing"),
            Self::GoingHome => write!(f, "goingHome"),
            Self::Parked => write!(f, "parked"),
            Self::StoppedInGarden => write!(f, "stoppedInGarden"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// Operating mode, read by `modeOfOperation` and written by `SetMode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeOfOperation {
    /// Follow the schedule
    Auto,
    /// Manual operation
    Manual,
    /// Stay in the station
    Home,
    /// Demo mode
    Demo,
    /// Point of interest
    Poi,
    /// Code not known to this library
    Unknown(u8),
}

impl From<u8> for ModeOfOperation {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Auto,
            1 => Self::Manual,
            2 => Self::Home,
            3 => Self::Demo,
            4 => Self::Poi,
            other => Self::Unknown(other),
        }
    }
}

impl From<ModeOfOperation> for u8 {
    fn from(mode: ModeOfOperation) -> Self {
        match mode {
            ModeOfOperation::Auto => 0,
            ModeOfOperation::Manual => 1,
            ModeOfOperation::Home => 2,
            ModeOfOperation::Demo => 3,
            ModeOfOperation::Poi => 4,
            ModeOfOperation::Unknown(other) => other,
        }
    }
}

impl fmt::Display for ModeOfOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
            Self::Home => write!(f, "home"),
            Self::Demo => write!(f, "demo"),
            Self::Poi => write!(f, "poi"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// Why the mower is not allowed to mow right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestrictionReason {
    /// No restriction
    None,
    /// Outside the week schedule
    WeekSchedule,
    /// Parked until further notice
    ParkOverride,
    /// Sensor condition, e.g. rain
    Sensor,
    /// Daily limit reached
    DailyLimit,
    /// Firmware update in progress
    Fota,
    /// Too cold
    Frost,
    /// Every work area has been completed
    AllWorkAreasCompleted,
    /// Restricted by an external source
    External,
    /// Code not known to this library
    Unknown(u8),
}

impl From<u8> for RestrictionReason {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::WeekSchedule,
            2 => Self::ParkOverride,
            3 => Self::Sensor,
            4 => Self::DailyLimit,
            5 => Self::Fota,
            6 => Self::Frost,
            7 => Self::AllWorkAreasCompleted,
            8 => Self::External,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for RestrictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::WeekSchedule => write!(f, "weekSchedule"),
            Self::ParkOverride => write!(f, "parkOverride"),
            Self::Sensor => write!(f, "sensor"),
            Self::DailyLimit => write!(f, "dailyLimit"),
            Self::Fota => write!(f, "fota"),
            Self::Frost => write!(f, "frost"),
            Self::AllWorkAreasCompleted => write!(f, "allWorkAreasCompleted"),
            Self::External => write!(f, "external"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// A mower seen during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Bluetooth address
    pub address: String,
    /// Advertised local name
    pub name: Option<String>,
    /// Signal strength (RSSI)
    pub rssi: Option<i16>,
    /// Advertisement carries the Husqvarna manufacturer id
    pub is_husqvarna: bool,
}

impl DeviceInfo {
    /// Create new device info
    #[must_use]
    pub const fn new(address: String) -> Self {
        Self {
            address,
            name: None,
            rssi: None,
            is_husqvarna: false,
        }
    }
}

/// One entry of the mower's weekly schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Start, in seconds after midnight
    pub start: u32,
    /// Duration in seconds
    pub duration: u32,
    /// Active weekdays, Monday first
    pub days: [bool; 7],
}

impl Task {
    /// Whether the task runs on the given weekday (0 = Monday)
    #[must_use]
    pub fn runs_on(&self, weekday: usize) -> bool {
        self.days.get(weekday).copied().unwrap_or(false)
    }
}

/// Lifetime counters reported by `GetAllStatistics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Total running time in seconds
    pub total_running_time: u32,
    /// Total cutting time in seconds
    pub total_cutting_time: u32,
    /// Total charging time in seconds
    pub total_charging_time: u32,
    /// Total searching time in seconds
    pub total_searching_time: u32,
    /// Number of collisions
    pub number_of_collisions: u32,
    /// Number of charging cycles
    pub number_of_charging_cycles: u32,
}

/// Entry of the mower's message log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MowerMessage {
    /// Unix timestamp
    pub time: u32,
    /// Message code
    pub code: u16,
    /// Severity level
    pub severity: u8,
    /// Acknowledge state
    pub ack_state: u8,
}

/// Connection parameters for the BLE layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Scan timeout in milliseconds
    pub scan_timeout_ms: u64,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// ATT MTU used for chunking writes
    pub mtu: usize,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 10_000,
            connect_timeout_ms: 30_000,
            mtu: crate::transport::DEFAULT_MTU,
        }
    }
}

/// Session timing and identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fixed channel id; a random one is drawn when absent
    pub channel_id: Option<u32>,
    /// PIN sent after the handshake
    pub pin: Option<u16>,
    /// Attempts per exchange before the session is torn down
    pub attempts: u32,
    /// Wait for the first chunk of a response in milliseconds
    pub first_chunk_timeout_ms: u64,
    /// Wait for each further chunk in milliseconds
    pub continuation_timeout_ms: u64,
    /// Keep-alive interval in milliseconds
    pub keepalive_interval_ms: u64,
    /// Pause between subscribing and the first write in milliseconds
    pub settle_delay_ms: u64,
}

impl SessionConfig {
    /// First-chunk timeout as a [`Duration`]
    #[must_use]
    pub const fn first_chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.first_chunk_timeout_ms)
    }

    /// Continuation timeout as a [`Duration`]
    #[must_use]
    pub const fn continuation_timeout(&self) -> Duration {
        Duration::from_millis(self.continuation_timeout_ms)
    }

    /// Keep-alive interval as a [`Duration`]
    #[must_use]
    pub const fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    /// Settle delay as a [`Duration`]
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_id: None,
            pin: None,
            attempts: 5,
            first_chunk_timeout_ms: 10_000,
            continuation_timeout_ms: 5_000,
            keepalive_interval_ms: 15_000,
            settle_delay_ms: 5_000,
        }
    }
}
