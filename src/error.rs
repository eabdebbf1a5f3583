use thiserror::Error;

use crate::protocol::ResultCode;

/// Errors that can occur when talking to an Automower
#[derive(Error, Debug)]
pub enum MowerError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// Device not found during scanning
    #[error("Automower device not found")]
    DeviceNotFound,

    /// Device connection failed
    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    /// Device disconnected unexpectedly
    #[error("Device disconnected")]
    Disconnected,

    /// No complete response arrived within the retry budget
    #[error("No response from device after {attempts} attempts")]
    Timeout {
        /// Number of attempts that were made
        attempts: u32,
    },

    /// Frame failed marker, checksum or channel validation
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A request field declared by the schema was not supplied
    #[error("Missing request parameter '{field}' for command {command}")]
    MissingParameter {
        /// Field name from the schema
        field: String,
        /// Command name
        command: String,
    },

    /// The command schema is invalid or a value does not fit its declared type
    #[error("Schema error: {0}")]
    Schema(String),

    /// Response payload length does not match the declared fields
    #[error("Data length mismatch: read {expected} bytes of {actual}")]
    LengthMismatch {
        /// Bytes consumed by the declared fields
        expected: usize,
        /// Bytes present in the payload
        actual: usize,
    },

    /// A frame could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The device answered with a non-OK result code
    #[error("Device rejected command: {code}")]
    DeviceResult {
        /// Result code reported by the device
        code: ResultCode,
    },

    /// Command name is not present in the schema
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The session is not in a state that accepts commands
    #[error("Session not ready: {reason}")]
    NotReady {
        /// Reason why the session is not ready
        reason: String,
    },

    /// Schema JSON could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Automower operations
pub type Result<T> = std::result::Result<T, MowerError>;

impl MowerError {
    /// Check if this error indicates a connection issue
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_)
                | Self::ConnectionFailed(_)
                | Self::Disconnected
                | Self::DeviceNotFound
                | Self::Timeout { .. }
        )
    }

    /// Check if this error is recoverable by retrying on a fresh session
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::NotReady { .. } | Self::MalformedFrame(_)
        )
    }

    /// Check if this error points at the schema rather than the device
    #[must_use]
    pub const fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter { .. }
                | Self::Schema(_)
                | Self::LengthMismatch { .. }
                | Self::UnknownCommand(_)
                | Self::Json(_)
        )
    }
}
