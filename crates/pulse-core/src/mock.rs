//! In-memory platform for testing.
//!
//! [`MockCentral`] and [`MockLink`] implement the [`Central`] and [`GattLink`]
//! seams without Bluetooth hardware, so a [`DeviceSession`](crate::DeviceSession)
//! can be driven end to end in tests.
//!
//! # Features
//!
//! - **GATT table**: services and characteristics with initial values
//! - **Failure injection**: per-characteristic read and subscribe failures,
//!   service enumeration, selection, connect and unlink failures
//! - **Latency simulation**: artificial delays for select, connect and reads
//! - **Notification injection**: push values as if the peripheral notified them
//! - **Link loss**: drop the link as if the peer went away
//!
//! `MockLink` is a cheap handle; clones share state, so a test can keep one
//! while the session owns another.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use uuid::Uuid;

use pulse_types::{CharacteristicProperties, Device};

use crate::classify::PlatformError;
use crate::link::{Central, GattCharacteristic, GattLink, LinkEvent};
use crate::selector::{Advertisement, DeviceSelector};

#[derive(Debug, Clone)]
struct MockCharacteristic {
    characteristic: GattCharacteristic,
    value: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct MockState {
    services: Vec<(Uuid, Vec<MockCharacteristic>)>,
    read_failures: HashMap<Uuid, PlatformError>,
    subscribe_failures: HashMap<Uuid, PlatformError>,
    services_failure: Option<PlatformError>,
    connect_failure: Option<PlatformError>,
    disconnect_failure: Option<PlatformError>,
    read_counts: HashMap<Uuid, u32>,
    subscribed: HashSet<Uuid>,
    events: Option<mpsc::UnboundedSender<LinkEvent>>,
}

impl MockState {
    fn find(&self, uuid: &Uuid) -> Option<&MockCharacteristic> {
        self.services
            .iter()
            .flat_map(|(_, chars)| chars.iter())
            .find(|c| c.characteristic.uuid == *uuid)
    }

    fn find_mut(&mut self, uuid: &Uuid) -> Option<&mut MockCharacteristic> {
        self.services
            .iter_mut()
            .flat_map(|(_, chars)| chars.iter_mut())
            .find(|c| c.characteristic.uuid == *uuid)
    }
}

#[derive(Debug)]
struct MockLinkInner {
    device: Device,
    rssi: i16,
    state: Mutex<MockState>,
    connected: AtomicBool,
    /// Simulated read latency in milliseconds (0 = no delay).
    read_latency_ms: AtomicU64,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
    connect_count: AtomicU32,
    disconnect_count: AtomicU32,
}

/// A mock peripheral.
///
/// # Example
///
/// ```
/// use pulse_core::MockLink;
/// use pulse_types::CharacteristicProperties;
/// use pulse_types::uuids::{BATTERY_LEVEL, BATTERY_SERVICE};
///
/// let link = MockLink::builder("AA:BB:CC:DD:EE:FF")
///     .name("Garmin HRM")
///     .characteristic(BATTERY_SERVICE, BATTERY_LEVEL, CharacteristicProperties::READ, Some(vec![90]))
///     .build();
/// assert_eq!(link.device().name.as_deref(), Some("Garmin HRM"));
/// ```
#[derive(Debug, Clone)]
pub struct MockLink {
    inner: Arc<MockLinkInner>,
}

/// Builder for [`MockLink`].
#[derive(Debug)]
pub struct MockLinkBuilder {
    id: String,
    name: Option<String>,
    rssi: i16,
    services: Vec<(Uuid, Vec<MockCharacteristic>)>,
}

impl MockLinkBuilder {
    /// Set the advertised name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the advertised RSSI.
    #[must_use]
    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    /// Add a service with no characteristics.
    #[must_use]
    pub fn service(mut self, service: Uuid) -> Self {
        self.service_mut(service);
        self
    }

    /// Add a characteristic, creating its service if needed.
    #[must_use]
    pub fn characteristic(
        mut self,
        service: Uuid,
        uuid: Uuid,
        properties: CharacteristicProperties,
        value: Option<Vec<u8>>,
    ) -> Self {
        self.service_mut(service).push(MockCharacteristic {
            characteristic: GattCharacteristic::new(uuid, service, properties),
            value,
        });
        self
    }

    fn service_mut(&mut self, service: Uuid) -> &mut Vec<MockCharacteristic> {
        let index = match self.services.iter().position(|(uuid, _)| *uuid == service) {
            Some(index) => index,
            None => {
                self.services.push((service, Vec::new()));
                self.services.len() - 1
            }
        };
        &mut self.services[index].1
    }

    pub fn build(self) -> MockLink {
        let mut device = Device::new(self.id);
        device.name = self.name;
        MockLink {
            inner: Arc::new(MockLinkInner {
                device,
                rssi: self.rssi,
                state: Mutex::new(MockState {
                    services: self.services,
                    ..MockState::default()
                }),
                connected: AtomicBool::new(false),
                read_latency_ms: AtomicU64::new(0),
                connect_latency_ms: AtomicU64::new(0),
                connect_count: AtomicU32::new(0),
                disconnect_count: AtomicU32::new(0),
            }),
        }
    }
}

impl MockLink {
    /// Start building a mock peripheral with platform id `id`.
    pub fn builder(id: impl Into<String>) -> MockLinkBuilder {
        MockLinkBuilder {
            id: id.into(),
            name: None,
            rssi: -55,
            services: Vec::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// What this peripheral advertises.
    pub fn advertisement(&self) -> Advertisement {
        Advertisement {
            id: self.inner.device.id.clone(),
            address: Some(self.inner.device.id.clone()),
            name: self.inner.device.name.clone(),
            services: self.state().services.iter().map(|(uuid, _)| *uuid).collect(),
            rssi: Some(self.inner.rssi),
        }
    }

    // --- Failure injection ---

    /// Make every read of `characteristic` fail.
    pub fn fail_read(&self, characteristic: Uuid, error: PlatformError) {
        self.state().read_failures.insert(characteristic, error);
    }

    /// Make subscribing to `characteristic` fail.
    pub fn fail_subscribe(&self, characteristic: Uuid, error: PlatformError) {
        self.state().subscribe_failures.insert(characteristic, error);
    }

    /// Make service enumeration fail.
    pub fn fail_services(&self, error: PlatformError) {
        self.state().services_failure = Some(error);
    }

    /// Make `connect` fail.
    pub fn fail_connect(&self, error: PlatformError) {
        self.state().connect_failure = Some(error);
    }

    /// Make `disconnect` report an error (the link still goes down).
    pub fn fail_disconnect(&self, error: PlatformError) {
        self.state().disconnect_failure = Some(error);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.read_failures.clear();
        state.subscribe_failures.clear();
        state.services_failure = None;
        state.connect_failure = None;
        state.disconnect_failure = None;
    }

    // --- Latency simulation ---

    /// Delay every read by `latency`.
    pub fn set_read_latency(&self, latency: Duration) {
        self.inner
            .read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Delay `connect` by `latency`.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.inner
            .connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    // --- Peripheral behaviour ---

    /// Replace the stored value of a characteristic.
    pub fn set_value(&self, characteristic: Uuid, value: Vec<u8>) {
        if let Some(c) = self.state().find_mut(&characteristic) {
            c.value = Some(value);
        }
    }

    /// Drop a characteristic from the GATT table, as after a firmware update.
    pub fn remove_characteristic(&self, characteristic: &Uuid) {
        for (_, chars) in &mut self.state().services {
            chars.retain(|c| c.characteristic.uuid != *characteristic);
        }
    }

    /// Push a notification. Returns `false` if no event stream is attached.
    pub fn push_notification(&self, characteristic: Uuid, value: Vec<u8>) -> bool {
        let state = self.state();
        match &state.events {
            Some(tx) => tx
                .unbounded_send(LinkEvent::Notification {
                    characteristic,
                    value,
                })
                .is_ok(),
            None => false,
        }
    }

    /// Simulate the peer dropping the link.
    pub fn drop_link(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        let mut state = self.state();
        state.subscribed.clear();
        if let Some(tx) = state.events.take() {
            let _ = tx.unbounded_send(LinkEvent::Disconnected);
        }
    }

    // --- Inspection ---

    pub fn device(&self) -> Device {
        self.inner.device.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Reads dispatched for `characteristic`.
    pub fn read_count(&self, characteristic: &Uuid) -> u32 {
        self.state()
            .read_counts
            .get(characteristic)
            .copied()
            .unwrap_or(0)
    }

    /// Reads dispatched for all characteristics.
    pub fn total_reads(&self) -> u32 {
        self.state().read_counts.values().sum()
    }

    pub fn is_subscribed(&self, characteristic: &Uuid) -> bool {
        self.state().subscribed.contains(characteristic)
    }

    pub fn connect_count(&self) -> u32 {
        self.inner.connect_count.load(Ordering::Relaxed)
    }

    pub fn disconnect_count(&self) -> u32 {
        self.inner.disconnect_count.load(Ordering::Relaxed)
    }

    fn check_connected(&self) -> Result<(), PlatformError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(PlatformError::with_code(
                "not_connected",
                "GATT server is disconnected",
            ))
        }
    }
}

#[async_trait]
impl GattLink for MockLink {
    fn device(&self) -> Device {
        MockLink::device(self)
    }

    async fn connect(&self) -> Result<(), PlatformError> {
        let latency = self.inner.connect_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if let Some(err) = self.state().connect_failure.clone() {
            return Err(err);
        }
        self.inner.connect_count.fetch_add(1, Ordering::Relaxed);
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PlatformError> {
        self.inner.disconnect_count.fetch_add(1, Ordering::Relaxed);
        self.inner.connected.store(false, Ordering::SeqCst);
        let mut state = self.state();
        state.subscribed.clear();
        // Dropping the sender ends the event stream.
        state.events = None;
        match state.disconnect_failure.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn primary_services(&self) -> Result<Vec<Uuid>, PlatformError> {
        self.check_connected()?;
        let state = self.state();
        if let Some(err) = state.services_failure.clone() {
            return Err(err);
        }
        Ok(state.services.iter().map(|(uuid, _)| *uuid).collect())
    }

    async fn characteristics(
        &self,
        service: Uuid,
    ) -> Result<Vec<GattCharacteristic>, PlatformError> {
        self.check_connected()?;
        let state = self.state();
        state
            .services
            .iter()
            .find(|(uuid, _)| *uuid == service)
            .map(|(_, chars)| chars.iter().map(|c| c.characteristic.clone()).collect())
            .ok_or_else(|| PlatformError::new(format!("No such service: {service}")))
    }

    async fn read(&self, characteristic: &GattCharacteristic) -> Result<Vec<u8>, PlatformError> {
        self.check_connected()?;
        *self
            .state()
            .read_counts
            .entry(characteristic.uuid)
            .or_insert(0) += 1;

        let latency = self.inner.read_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let state = self.state();
        if let Some(err) = state.read_failures.get(&characteristic.uuid) {
            return Err(err.clone());
        }
        let entry = state
            .find(&characteristic.uuid)
            .ok_or_else(|| PlatformError::new("No such characteristic"))?;
        if !entry.characteristic.properties.read {
            return Err(PlatformError::with_code(
                "NotSupportedError",
                "Read not permitted",
            ));
        }
        Ok(entry.value.clone().unwrap_or_default())
    }

    async fn subscribe(&self, characteristic: &GattCharacteristic) -> Result<(), PlatformError> {
        self.check_connected()?;
        let mut state = self.state();
        if let Some(err) = state.subscribe_failures.get(&characteristic.uuid) {
            return Err(err.clone());
        }
        state.subscribed.insert(characteristic.uuid);
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, LinkEvent>, PlatformError> {
        self.check_connected()?;
        let (tx, rx) = mpsc::unbounded();
        self.state().events = Some(tx);
        Ok(rx.boxed())
    }
}

/// A mock central that selects among registered [`MockLink`]s.
#[derive(Debug, Default)]
pub struct MockCentral {
    links: Mutex<Vec<MockLink>>,
    select_failure: Mutex<Option<PlatformError>>,
    /// Simulated selection latency in milliseconds (0 = no delay).
    select_latency_ms: AtomicU64,
    select_count: AtomicU32,
}

impl MockCentral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a central offering a single peripheral.
    pub fn with_link(link: MockLink) -> Self {
        let central = Self::new();
        central.add_link(link);
        central
    }

    /// Offer another peripheral.
    pub fn add_link(&self, link: MockLink) {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(link);
    }

    /// Make selection fail.
    pub fn fail_select(&self, error: PlatformError) {
        *self
            .select_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Remove an injected selection failure.
    pub fn clear_failures(&self) {
        *self
            .select_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Delay selection by `latency`.
    pub fn set_select_latency(&self, latency: Duration) {
        self.select_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of completed or attempted selections.
    pub fn select_count(&self) -> u32 {
        self.select_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Central for MockCentral {
    type Link = MockLink;

    async fn select(&self, selector: &DeviceSelector) -> Result<MockLink, PlatformError> {
        self.select_count.fetch_add(1, Ordering::Relaxed);

        let latency = self.select_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if let Some(err) = self
            .select_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(err);
        }

        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|link| selector.matches(&link.advertisement()))
            .cloned()
            .ok_or_else(|| {
                PlatformError::with_code("NotFoundError", "No device matched the selector")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_types::uuids::{BATTERY_LEVEL, BATTERY_SERVICE, HEART_RATE_MEASUREMENT, HEART_RATE_SERVICE};

    fn link() -> MockLink {
        MockLink::builder("AA:BB:CC:DD:EE:FF")
            .name("Garmin HRM")
            .characteristic(
                HEART_RATE_SERVICE,
                HEART_RATE_MEASUREMENT,
                CharacteristicProperties::NOTIFY,
                None,
            )
            .characteristic(
                BATTERY_SERVICE,
                BATTERY_LEVEL,
                CharacteristicProperties::READ,
                Some(vec![77]),
            )
            .build()
    }

    fn battery() -> GattCharacteristic {
        GattCharacteristic::new(BATTERY_LEVEL, BATTERY_SERVICE, CharacteristicProperties::READ)
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let link = link();
        assert!(link.primary_services().await.is_err());
        assert!(link.read(&battery()).await.is_err());

        link.connect().await.unwrap();
        assert_eq!(
            link.primary_services().await.unwrap(),
            vec![HEART_RATE_SERVICE, BATTERY_SERVICE]
        );
        assert_eq!(link.read(&battery()).await.unwrap(), vec![77]);
        assert_eq!(link.read_count(&BATTERY_LEVEL), 1);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let link = link();
        link.fail_connect(PlatformError::with_code("NetworkError", "radio off"));
        assert!(link.connect().await.is_err());
        assert!(!link.is_connected());

        link.clear_failures();
        link.connect().await.unwrap();
        assert_eq!(link.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_and_set_value() {
        let link = link();
        link.connect().await.unwrap();
        link.fail_read(BATTERY_LEVEL, PlatformError::new("GATT error"));
        assert!(link.read(&battery()).await.is_err());

        link.clear_failures();
        link.set_value(BATTERY_LEVEL, vec![12]);
        assert_eq!(link.read(&battery()).await.unwrap(), vec![12]);
        assert_eq!(link.read_count(&BATTERY_LEVEL), 2);
    }

    #[tokio::test]
    async fn test_notifications_and_link_loss() {
        let link = link();
        assert!(!link.push_notification(HEART_RATE_MEASUREMENT, vec![0x00, 60]));

        link.connect().await.unwrap();
        let mut events = link.events().await.unwrap();
        assert!(link.push_notification(HEART_RATE_MEASUREMENT, vec![0x00, 60]));
        assert_eq!(
            events.next().await,
            Some(LinkEvent::Notification {
                characteristic: HEART_RATE_MEASUREMENT,
                value: vec![0x00, 60],
            })
        );

        link.drop_link();
        assert_eq!(events.next().await, Some(LinkEvent::Disconnected));
        assert_eq!(events.next().await, None);
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_ends_event_stream() {
        let link = link();
        link.connect().await.unwrap();
        let mut events = link.events().await.unwrap();
        link.disconnect().await.unwrap();
        assert_eq!(events.next().await, None);
        assert_eq!(link.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_central_selects_matching_link() {
        let central = MockCentral::with_link(link());
        let selected = central.select(&DeviceSelector::wearables()).await.unwrap();
        assert_eq!(selected.device().id, "AA:BB:CC:DD:EE:FF");

        let err = central
            .select(&DeviceSelector::accept_all().with_identifier("polar"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::DeviceNotFound);
        assert_eq!(central.select_count(), 2);
    }

    #[tokio::test]
    async fn test_central_select_failure() {
        let central = MockCentral::with_link(link());
        central.fail_select(PlatformError::with_code("NotAllowedError", "denied"));
        let err = central
            .select(&DeviceSelector::accept_all())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::PermissionDenied);
    }
}
