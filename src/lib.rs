#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # automower-ble
//!
//! A Rust library for talking to Husqvarna Automower (and Gardena) robotic
//! mowers over Bluetooth Low Energy.
//!
//! The mower speaks a framed request/response protocol on a vendor GATT
//! service. This crate builds and checks those frames, reassembles
//! notifications split across MTU-sized chunks, runs the connect sequence
//! (channel setup, handshake, optional PIN) and keeps the session alive in
//! the background.
//!
//! ## Layers
//!
//! - [`protocol`]: frame layout, checksum and response validation
//! - [`schema`]: named commands with typed request and response fields
//! - [`reassembly`]: turns notification chunks back into frames
//! - [`session`]: the connect sequence, command exchange and keep-alive
//! - [`mower`]: typed queries and actions on top of a session
//! - [`ble`]: discovery and a [`Transport`] backed by btleplug
//!
//! ## Quick Start
//!
//! ```no_run
//! use automower_ble::{ConnectionParams, Mower, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig {
//!         pin: Some(1234),
//!         ..Default::default()
//!     };
//!     let mower =
//!         Mower::connect_address("C8:DF:84:12:34:56", &ConnectionParams::default(), config)
//!             .await?;
//!
//!     println!("Battery: {}%", mower.battery_level().await?);
//!     mower.park().await?;
//!
//!     mower.disconnect().await?;
//!     Ok(())
//! }
//! ```

use uuid::Uuid;

/// Bluetooth Low Energy discovery and transport
pub mod ble;
/// Frame checksum
pub mod crc;
/// Error types and handling
pub mod error;
/// Known mower models
pub mod models;
/// Typed mower interface
pub mod mower;
/// Frame layout and validation
pub mod protocol;
/// Notification reassembly
pub mod reassembly;
/// Command schema
pub mod schema;
/// Session lifecycle and command exchange
pub mod session;
/// Transport abstraction
pub mod transport;
/// Type definitions and data structures
pub mod types;

#[cfg(test)]
mod testutil;

pub use ble::{BleManager, BleTransport, GattInfo};
pub use error::{MowerError, Result};
pub use models::{Manufacturer, MowerModel};
pub use mower::Mower;
pub use protocol::{FrameCodec, ResultCode};
pub use schema::{CommandTable, FieldValue, Params, Response, ResponseFields};
pub use session::{SessionController, SessionState};
pub use transport::Transport;
pub use types::{
    ConnectionParams, DeviceInfo, ModeOfOperation, MowerActivity, MowerMessage, MowerState,
    RestrictionReason, SessionConfig, Statistics, Task,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Primary mower GATT service
pub const MOWER_SERVICE_UUID: Uuid = Uuid::from_u128(0x98bd_0001_0b0e_421a_84e5_ddbf_75dc_6de4);

/// Characteristic the host writes request chunks to
pub const MOWER_WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x98bd_0002_0b0e_421a_84e5_ddbf_75dc_6de4);

/// Characteristic the mower notifies response chunks on
pub const MOWER_NOTIFY_CHAR_UUID: Uuid =
    Uuid::from_u128(0x98bd_0003_0b0e_421a_84e5_ddbf_75dc_6de4);

/// Readable characteristic holding the raw device type
pub const DEVICE_TYPE_CHAR_UUID: Uuid = Uuid::from_u128(0x98bd_0004_0b0e_421a_84e5_ddbf_75dc_6de4);

/// Generic Access device name characteristic
pub const DEVICE_NAME_CHAR_UUID: Uuid = Uuid::from_u128(0x0000_2a00_0000_1000_8000_0080_5f9b_34fb);

/// Husqvarna company identifier in advertisement manufacturer data
pub const HUSQVARNA_MANUFACTURER_ID: u16 = 0x0426;
