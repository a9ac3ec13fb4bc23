//! Platform seam between the session and a Bluetooth stack.
//!
//! [`Central`] selects a device; the [`GattLink`] it returns establishes the
//! connection and performs GATT operations. Every operation is a suspension
//! point. Notifications and link loss arrive through [`GattLink::events`] and
//! may interleave with an in-flight discovery walk.
//!
//! [`BtleCentral`](crate::BtleCentral) implements these traits over btleplug and
//! [`MockCentral`](crate::MockCentral) implements them in memory for tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use pulse_types::{CharacteristicProperties, Device};

use crate::classify::PlatformError;
use crate::selector::DeviceSelector;

/// A characteristic as enumerated by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: CharacteristicProperties,
}

impl GattCharacteristic {
    pub fn new(uuid: Uuid, service_uuid: Uuid, properties: CharacteristicProperties) -> Self {
        Self {
            uuid,
            service_uuid,
            properties,
        }
    }
}

/// Asynchronous signals raised by the platform for a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A subscribed characteristic pushed a value.
    Notification { characteristic: Uuid, value: Vec<u8> },
    /// The peer or radio dropped the link.
    Disconnected,
}

/// Device selection.
#[async_trait]
pub trait Central: Send + Sync + 'static {
    type Link: GattLink;

    /// Select a device matching `selector`.
    ///
    /// Implementations may wait indefinitely; the session bounds the call
    /// with its selection timeout.
    async fn select(&self, selector: &DeviceSelector) -> Result<Self::Link, PlatformError>;
}

/// A selected device and its GATT operations.
#[async_trait]
pub trait GattLink: Send + Sync + 'static {
    /// The device this link belongs to.
    fn device(&self) -> Device;

    /// Establish the link.
    async fn connect(&self) -> Result<(), PlatformError>;

    /// Tear the link down.
    async fn disconnect(&self) -> Result<(), PlatformError>;

    /// Enumerate primary services.
    async fn primary_services(&self) -> Result<Vec<Uuid>, PlatformError>;

    /// Enumerate the characteristics of one service.
    async fn characteristics(&self, service: Uuid)
    -> Result<Vec<GattCharacteristic>, PlatformError>;

    /// Read a characteristic value once.
    async fn read(&self, characteristic: &GattCharacteristic) -> Result<Vec<u8>, PlatformError>;

    /// Enable notifications or indications for a characteristic.
    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<(), PlatformError>;

    /// Stream of notifications and link-loss signals for this link.
    ///
    /// Called once per connection, after [`GattLink::connect`] succeeds.
    async fn events(&self) -> Result<BoxStream<'static, LinkEvent>, PlatformError>;
}
