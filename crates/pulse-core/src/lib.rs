//! BLE GATT telemetry session for wearables.
//!
//! This crate connects to a Bluetooth Low Energy wearable, discovers its GATT
//! services, decodes what it reads and what the device pushes, and fans the
//! resulting samples out to any number of in-process consumers.
//!
//! # Features
//!
//! - **Device session**: a single-link state machine with connect, disconnect
//!   and link-loss handling
//! - **Discovery**: walks every primary service and characteristic, reading and
//!   subscribing opportunistically; one failing characteristic never aborts the
//!   walk
//! - **Decoding**: a registration-based table for Heart Rate Measurement,
//!   Battery Level and Device Information strings
//! - **Error classification**: heterogeneous platform failures mapped to a
//!   small closed taxonomy
//! - **Event bus**: callback subscribers isolated from each other, plus a
//!   broadcast channel for async consumers
//! - **Synthetic source**: timer-driven samples with the same event shapes, for
//!   running consumers without hardware
//!
//! # Generations
//!
//! Every connect attempt and every teardown advances the session generation.
//! Discovery results, cached values and notifications are applied only while
//! their generation is live, so a slow read that completes after a disconnect
//! never becomes visible.
//!
//! # Quick Start
//!
//! ```no_run
//! use pulse_core::{BtleCentral, DeviceSession, SessionEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = DeviceSession::new(BtleCentral::new().await?);
//!     let mut events = session.bus().receiver();
//!
//!     let device = session.connect(None).await?;
//!     println!("Connected to {device}");
//!     if let Some(info) = session.device_info().await {
//!         println!("Model: {:?}", info.model);
//!     }
//!
//!     while let Ok(event) = events.recv().await {
//!         if let SessionEvent::Sample { sample, .. } = event {
//!             println!("{sample}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod bus;
pub mod classify;
pub mod decode;
pub mod error;
pub mod events;
pub mod generation;
pub mod link;
pub mod mock;
pub mod registry;
pub mod scan;
pub mod selector;
pub mod session;
pub mod synthetic;
pub mod traits;

// Core exports
pub use error::{ConnectError, Error, Result};
pub use session::{DeviceSession, SessionConfig};
pub use traits::SampleSource;

pub use btle::{BtleCentral, BtleLink};
pub use bus::{BoxError, NotificationBus, Subscription};
pub use classify::{ErrorKind, PlatformError, classify};
pub use decode::{Decoder, DecoderTable};
pub use events::{DisconnectReason, IssueCategory, SessionEvent};
pub use generation::{Generation, GenerationCounter};
pub use link::{Central, GattCharacteristic, GattLink, LinkEvent};
pub use mock::{MockCentral, MockLink, MockLinkBuilder};
pub use registry::{
    CharacteristicEntry, DiscoveryFailure, DiscoveryReport, DiscoveryStage, ServiceEntry,
    ServiceRegistry, SharedRegistry, StaleGeneration, discover_all,
};
pub use scan::{DiscoveredDevice, ScanOptions, get_adapter};
pub use selector::{Advertisement, DeviceSelector};
pub use synthetic::{SampleGenerator, SyntheticOptions, SyntheticSource};

// Re-export from pulse-types
pub use pulse_types;
pub use pulse_types::uuid as uuids;
pub use pulse_types::{
    CharacteristicProperties, DecodeError, DecodedSample, Device, DeviceInfo,
    HeartRateMeasurement, SessionState,
};
