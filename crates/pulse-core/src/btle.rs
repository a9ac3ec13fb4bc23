//! btleplug backend for the platform seam.
//!
//! [`BtleCentral`] selects a device by scanning until an advertisement matches
//! the selector; [`BtleLink`] maps GATT operations onto a btleplug
//! [`Peripheral`]. Link loss is detected from the adapter's
//! `DeviceDisconnected` event.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    CentralEvent, CharPropFlags, Central as _, Characteristic, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pulse_types::{CharacteristicProperties, Device};

use crate::classify::PlatformError;
use crate::error::Result;
use crate::link::{Central, GattCharacteristic, GattLink, LinkEvent};
use crate::scan::{DiscoveredDevice, get_adapter, matching_peripherals};
use crate::selector::DeviceSelector;

/// How often known peripherals are re-checked while scanning for a match.
pub const DEFAULT_SELECT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Device selection over a btleplug adapter.
#[derive(Debug, Clone)]
pub struct BtleCentral {
    adapter: Adapter,
    poll_interval: Duration,
}

impl BtleCentral {
    /// Use the first Bluetooth adapter.
    pub async fn new() -> Result<Self> {
        Ok(Self::with_adapter(get_adapter().await?))
    }

    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            poll_interval: DEFAULT_SELECT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// The best matching peripheral known to the adapter, by RSSI.
    async fn best_match(
        &self,
        selector: &DeviceSelector,
    ) -> std::result::Result<Option<BtleLink>, PlatformError> {
        let best = matching_peripherals(&self.adapter, selector)
            .await?
            .into_iter()
            .max_by_key(|(_, adv)| adv.rssi.unwrap_or(i16::MIN));

        Ok(best.map(|(peripheral, adv)| {
            let discovered = DiscoveredDevice::from(&adv);
            let mut device = Device::new(discovered.identifier);
            device.name = discovered.name;
            BtleLink {
                adapter: self.adapter.clone(),
                peripheral,
                device,
            }
        }))
    }
}

/// Stops an active scan when selection finishes or is abandoned.
struct ScanGuard {
    adapter: Adapter,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let adapter = self.adapter.clone();
            handle.spawn(async move {
                if let Err(e) = adapter.stop_scan().await {
                    debug!("Failed to stop scan: {}", e);
                }
            });
        }
    }
}

#[async_trait]
impl Central for BtleCentral {
    type Link = BtleLink;

    async fn select(&self, selector: &DeviceSelector) -> std::result::Result<BtleLink, PlatformError> {
        if let Some(link) = self.best_match(selector).await? {
            info!(device = %link.device, "Found device in cache (no scan needed)");
            return Ok(link);
        }

        self.adapter.start_scan(ScanFilter::default()).await?;
        let _scan = ScanGuard {
            adapter: self.adapter.clone(),
        };
        info!("Scanning for a matching device...");

        loop {
            sleep(self.poll_interval).await;
            if let Some(link) = self.best_match(selector).await? {
                info!(device = %link.device, "Selected device");
                return Ok(link);
            }
        }
    }
}

/// A btleplug peripheral behind the [`GattLink`] seam.
#[derive(Debug, Clone)]
pub struct BtleLink {
    adapter: Adapter,
    peripheral: Peripheral,
    device: Device,
}

impl BtleLink {
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    fn find(&self, characteristic: &GattCharacteristic) -> std::result::Result<Characteristic, PlatformError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| {
                c.uuid == characteristic.uuid && c.service_uuid == characteristic.service_uuid
            })
            .ok_or_else(|| {
                PlatformError::with_code(
                    "NotFoundError",
                    format!("characteristic {} not found", characteristic.uuid),
                )
            })
    }
}

fn properties_of(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        read: flags.contains(CharPropFlags::READ),
        write: flags.intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
    }
}

#[async_trait]
impl GattLink for BtleLink {
    fn device(&self) -> Device {
        self.device.clone()
    }

    async fn connect(&self) -> std::result::Result<(), PlatformError> {
        if self.peripheral.is_connected().await? {
            debug!("Peripheral already connected");
            return Ok(());
        }
        self.peripheral.connect().await?;
        Ok(())
    }

    async fn disconnect(&self) -> std::result::Result<(), PlatformError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn primary_services(&self) -> std::result::Result<Vec<Uuid>, PlatformError> {
        self.peripheral.discover_services().await?;
        let services: Vec<Uuid> = self
            .peripheral
            .services()
            .into_iter()
            .filter(|s| s.primary)
            .map(|s| s.uuid)
            .collect();
        debug!("Found {} primary services", services.len());
        Ok(services)
    }

    async fn characteristics(
        &self,
        service: Uuid,
    ) -> std::result::Result<Vec<GattCharacteristic>, PlatformError> {
        let service = self
            .peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .ok_or_else(|| {
                PlatformError::with_code("NotFoundError", format!("service {service} not found"))
            })?;

        Ok(service
            .characteristics
            .into_iter()
            .map(|c| GattCharacteristic::new(c.uuid, c.service_uuid, properties_of(c.properties)))
            .collect())
    }

    async fn read(
        &self,
        characteristic: &GattCharacteristic,
    ) -> std::result::Result<Vec<u8>, PlatformError> {
        let target = self.find(characteristic)?;
        Ok(self.peripheral.read(&target).await?)
    }

    async fn subscribe(
        &self,
        characteristic: &GattCharacteristic,
    ) -> std::result::Result<(), PlatformError> {
        let target = self.find(characteristic)?;
        self.peripheral.subscribe(&target).await?;
        Ok(())
    }

    async fn events(&self) -> std::result::Result<BoxStream<'static, LinkEvent>, PlatformError> {
        let notifications = self
            .peripheral
            .notifications()
            .await?
            .map(|n| LinkEvent::Notification {
                characteristic: n.uuid,
                value: n.value,
            });

        let id = self.peripheral.id();
        let disconnects = self.adapter.events().await?.filter_map(move |event| {
            let lost = matches!(&event, CentralEvent::DeviceDisconnected(peer) if *peer == id);
            if lost {
                warn!("Adapter reported disconnect");
            }
            async move { lost.then_some(LinkEvent::Disconnected) }
        });

        Ok(futures::stream::select(notifications, disconnects).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_of_maps_flags() {
        let props = properties_of(CharPropFlags::READ | CharPropFlags::NOTIFY);
        assert_eq!(props, CharacteristicProperties::READ_NOTIFY);

        let props = properties_of(CharPropFlags::WRITE_WITHOUT_RESPONSE);
        assert!(props.write && !props.read && !props.notify);

        let props = properties_of(CharPropFlags::INDICATE);
        assert_eq!(props, CharacteristicProperties::NOTIFY);

        assert_eq!(
            properties_of(CharPropFlags::empty()),
            CharacteristicProperties::default()
        );
    }
}
