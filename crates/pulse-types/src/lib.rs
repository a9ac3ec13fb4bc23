//! Platform-agnostic types for wearable GATT telemetry.
//!
//! This crate holds the data model shared by the session core and its
//! consumers. It has no Bluetooth dependency.
//!
//! # Features
//!
//! - Device, characteristic and session state types
//! - Heart Rate Measurement wire decoding
//! - Bluetooth SIG UUID constants for the standard wearable services
//! - Error types for characteristic decoding
//!
//! # Example
//!
//! ```
//! use pulse_types::HeartRateMeasurement;
//! use time::OffsetDateTime;
//!
//! let hr = HeartRateMeasurement::from_bytes(&[0x00, 0x48], OffsetDateTime::now_utc()).unwrap();
//! assert_eq!(hr.bpm, 72);
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{DecodeError, DecodeResult};
pub use types::{
    CharacteristicProperties, DecodedSample, Device, DeviceInfo, HeartRateMeasurement,
    SessionState,
};
pub use uuid as uuids;
