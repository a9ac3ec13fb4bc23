//! Device discovery and scanning.
//!
//! This module scans for advertising peripherals and filters them with a
//! [`DeviceSelector`].

use std::time::Duration;

use btleplug::api::{Central as _, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::classify::PlatformError;
use crate::error::{Error, Result};
use crate::selector::{Advertisement, DeviceSelector};

const NULL_ADDRESS: &str = "00:00:00:00:00:00";

/// A peripheral seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Platform peripheral identifier.
    pub id: String,
    pub name: Option<String>,
    /// The BLE address as a string (zeros on macOS, use `identifier` instead).
    pub address: String,
    /// A connection identifier (peripheral ID on macOS, address on other platforms).
    pub identifier: String,
    pub rssi: Option<i16>,
    /// Advertised service UUIDs.
    pub services: Vec<Uuid>,
}

impl From<&Advertisement> for DiscoveredDevice {
    fn from(adv: &Advertisement) -> Self {
        let address = adv
            .address
            .clone()
            .unwrap_or_else(|| NULL_ADDRESS.to_string());
        Self {
            identifier: create_identifier(&address, &adv.id),
            id: adv.id.clone(),
            name: adv.name.clone(),
            address,
            rssi: adv.rssi,
            services: adv.services.clone(),
        }
    }
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan for devices.
    pub duration: Duration,
    /// Which devices to report.
    pub selector: DeviceSelector,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
            selector: DeviceSelector::wearables(),
        }
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set scan duration in seconds.
    #[must_use]
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration = Duration::from_secs(secs);
        self
    }

    #[must_use]
    pub fn selector(mut self, selector: DeviceSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Report every advertising device.
    #[must_use]
    pub fn all_devices(self) -> Self {
        self.selector(DeviceSelector::accept_all())
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or_else(|| Error::Platform(PlatformError::new("No Bluetooth adapter found")))
}

/// Scan for wearables in range.
///
/// An empty list indicates no devices were found (not an error).
///
/// # Errors
///
/// Returns an error if no Bluetooth adapter is available or the scan could
/// not be started or stopped.
pub async fn scan_for_devices() -> Result<Vec<DiscoveredDevice>> {
    scan_with_options(ScanOptions::default()).await
}

/// Scan for devices with custom options.
pub async fn scan_with_options(options: ScanOptions) -> Result<Vec<DiscoveredDevice>> {
    let adapter = get_adapter().await?;
    scan_with_adapter(&adapter, options).await
}

/// Scan for devices using a specific adapter.
pub async fn scan_with_adapter(
    adapter: &Adapter,
    options: ScanOptions,
) -> Result<Vec<DiscoveredDevice>> {
    info!(
        "Starting BLE scan for {} seconds...",
        options.duration.as_secs()
    );

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(options.duration).await;
    adapter.stop_scan().await?;

    let mut discovered = Vec::new();
    for (_, adv) in matching_peripherals(adapter, &options.selector).await? {
        info!("Found device: {:?}", adv.name);
        discovered.push(DiscoveredDevice::from(&adv));
    }

    info!("Scan complete. Found {} device(s)", discovered.len());
    Ok(discovered)
}

/// Known peripherals whose advertisement matches `selector`.
pub(crate) async fn matching_peripherals(
    adapter: &Adapter,
    selector: &DeviceSelector,
) -> std::result::Result<Vec<(Peripheral, Advertisement)>, btleplug::Error> {
    let mut matched = Vec::new();
    for peripheral in adapter.peripherals().await? {
        match advertisement_of(&peripheral).await {
            Ok(Some(adv)) if selector.matches(&adv) => matched.push((peripheral, adv)),
            Ok(_) => {}
            Err(e) => debug!("Error processing peripheral: {}", e),
        }
    }
    Ok(matched)
}

/// Read what a peripheral has advertised so far.
pub(crate) async fn advertisement_of(
    peripheral: &Peripheral,
) -> std::result::Result<Option<Advertisement>, btleplug::Error> {
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };

    let mut services = properties.services.clone();
    for uuid in properties.service_data.keys() {
        if !services.contains(uuid) {
            services.push(*uuid);
        }
    }

    Ok(Some(Advertisement {
        id: format_peripheral_id(&peripheral.id()),
        address: Some(properties.address.to_string()),
        name: properties.local_name,
        services,
        rssi: properties.rssi,
    }))
}

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Pick the identifier to reconnect with.
///
/// On macOS where addresses are all zeros, uses the peripheral ID.
fn create_identifier(address: &str, peripheral_id: &str) -> String {
    if address == NULL_ADDRESS {
        peripheral_id.to_string()
    } else {
        address.to_string()
    }
}
