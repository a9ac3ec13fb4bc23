//! The device session state machine.
//!
//! A [`DeviceSession`] owns one link at a time and walks it through
//! `Disconnected → Connecting → Discovering → Ready → Disconnected`. It drives
//! discovery into the [`ServiceRegistry`](crate::ServiceRegistry), routes reads
//! and notifications through the [`DecoderTable`] and publishes the results on
//! its [`NotificationBus`].
//!
//! Each entry into `Connecting` and each teardown advances the session's
//! generation. Work started for one generation (a discovery walk, a read in
//! flight, the notification pump) checks the live generation before its
//! result is applied, so nothing from a superseded link leaks into a newer one.
//!
//! # Example
//!
//! ```no_run
//! use pulse_core::{BtleCentral, DeviceSelector, DeviceSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = DeviceSession::new(BtleCentral::new().await?);
//!     let _sub = session.bus().subscribe(|event| {
//!         println!("{event:?}");
//!         Ok(())
//!     });
//!
//!     let device = session.connect(Some(&DeviceSelector::wearables())).await?;
//!     println!("Connected to {device}");
//!     tokio::signal::ctrl_c().await?;
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pulse_types::uuids::{
    BATTERY_LEVEL, MANUFACTURER_NAME, MODEL_NUMBER, SERIAL_NUMBER, display_uuid,
};
use pulse_types::{DecodedSample, Device, DeviceInfo, SessionState};

use crate::bus::{DEFAULT_EVENT_CAPACITY, NotificationBus};
use crate::classify::ErrorKind;
use crate::decode::DecoderTable;
use crate::error::{ConnectError, Error, Result};
use crate::events::{DisconnectReason, IssueCategory, SessionEvent};
use crate::generation::{Generation, GenerationCounter};
use crate::link::{Central, GattLink, LinkEvent};
use crate::registry::{
    DiscoveryReport, DiscoveryStage, ServiceEntry, ServiceRegistry, SharedRegistry, discover_all,
};
use crate::selector::DeviceSelector;

/// Default timeout for device selection.
pub const DEFAULT_SELECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for establishing the link.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for a complete discovery walk.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a single GATT operation during discovery.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Session timeouts and defaults.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use pulse_core::SessionConfig;
///
/// let config = SessionConfig::default()
///     .connect_timeout(Duration::from_secs(20))
///     .read_timeout(Duration::from_secs(5));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Timeout for device selection. Expiry is reported as `DeviceNotFound`.
    pub selection_timeout: Duration,
    /// Timeout for link establishment. Expiry is reported as `TransportUnavailable`.
    pub connect_timeout: Duration,
    /// Timeout for the whole discovery walk. Expiry is logged and the session
    /// becomes ready with what was discovered so far.
    pub discovery_timeout: Duration,
    /// Timeout for each enumeration, read or subscription during discovery.
    pub read_timeout: Duration,
    /// Capacity of the bus broadcast channel.
    pub event_capacity: usize,
    /// Selector used when `connect` is called without one.
    pub default_selector: DeviceSelector,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            selection_timeout: DEFAULT_SELECTION_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            default_selector: DeviceSelector::wearables(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the device selection timeout.
    #[must_use]
    pub fn selection_timeout(mut self, timeout: Duration) -> Self {
        self.selection_timeout = timeout;
        self
    }

    /// Set the link establishment timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the discovery walk timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the per-operation timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the broadcast channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the selector used when `connect` is given none.
    #[must_use]
    pub fn default_selector(mut self, selector: DeviceSelector) -> Self {
        self.default_selector = selector;
        self
    }

    /// Validate the configuration.
    ///
    /// Checks that every timeout and the event capacity are non-zero.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("selection_timeout", self.selection_timeout),
            ("connect_timeout", self.connect_timeout),
            ("discovery_timeout", self.discovery_timeout),
            ("read_timeout", self.read_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(Error::invalid_config(format!("{name} must be > 0")));
            }
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        Ok(())
    }
}

struct ActiveLink<L> {
    generation: Generation,
    link: Arc<L>,
    device: Device,
    cancel: CancellationToken,
}

struct Inner<C: Central> {
    central: C,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    generations: GenerationCounter,
    registry: SharedRegistry,
    bus: NotificationBus,
    decoders: DecoderTable,
    active: Mutex<Option<ActiveLink<C::Link>>>,
}

/// A telemetry session with one wearable at a time.
///
/// Cloning yields another handle to the same session.
pub struct DeviceSession<C: Central> {
    inner: Arc<Inner<C>>,
}

impl<C: Central> Clone for DeviceSession<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Central> std::fmt::Debug for DeviceSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("state", &self.current_state())
            .field("generation", &self.generation())
            .field("device", &self.device())
            .finish_non_exhaustive()
    }
}

impl<C: Central> DeviceSession<C> {
    /// Create a session with the default configuration and decoder table.
    pub fn new(central: C) -> Self {
        Self::build(central, SessionConfig::default(), DecoderTable::standard())
    }

    /// Create a session with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is rejected by
    /// [`SessionConfig::validate`].
    pub fn with_config(central: C, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(central, config, DecoderTable::standard()))
    }

    /// Create a session with a custom configuration and decoder table.
    pub fn with_decoders(central: C, config: SessionConfig, decoders: DecoderTable) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(central, config, decoders))
    }

    fn build(central: C, config: SessionConfig, decoders: DecoderTable) -> Self {
        let generations = GenerationCounter::new();
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                central,
                bus: NotificationBus::new(config.event_capacity),
                config,
                state,
                registry: ServiceRegistry::shared(generations.clone()),
                generations,
                decoders,
                active: Mutex::new(None),
            }),
        }
    }

    /// Select a device, establish the link and run discovery.
    ///
    /// Only valid from `Disconnected`. A call in any other state fails fast
    /// with an [`ErrorKind::AlreadyConnected`] error and leaves the session
    /// untouched. With no `selector`, the configured default is used.
    ///
    /// # Errors
    ///
    /// - [`Error::Connect`] with the classified failure if selection or link
    ///   establishment fails; the session is back in `Disconnected`.
    /// - [`Error::Cancelled`] if `disconnect()` or a link loss superseded this
    ///   attempt.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn connect(&self, selector: Option<&DeviceSelector>) -> Result<Device> {
        let inner = &self.inner;

        let mut started = None;
        inner.state.send_if_modified(|state| {
            if *state != SessionState::Disconnected {
                return false;
            }
            started = Some(inner.generations.advance());
            *state = SessionState::Connecting;
            true
        });
        let Some(generation) = started else {
            let state = *inner.state.borrow();
            return Err(Error::connect(
                ErrorKind::AlreadyConnected,
                format!("session is {state}"),
            ));
        };
        inner.bus.publish(&SessionEvent::Connecting { generation });

        let selector = selector.unwrap_or(&inner.config.default_selector);
        match inner.establish(generation, selector).await {
            Ok(device) => Ok(device),
            Err(Error::Cancelled) => {
                info!(%generation, "Connect superseded");
                Err(Error::Cancelled)
            }
            Err(e) => {
                warn!(%generation, "Connect failed: {}", e);
                inner
                    .teardown(Some(generation), DisconnectReason::ConnectFailed(e.kind()))
                    .await;
                Err(e)
            }
        }
    }

    /// Tear down the link and return to `Disconnected`.
    ///
    /// A no-op when already disconnected. An in-flight platform operation is
    /// not preempted; its result is discarded when it completes. Failures of
    /// the unlink call are logged, never returned.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn disconnect(&self) {
        if self
            .inner
            .teardown(None, DisconnectReason::UserRequested)
            .await
        {
            info!("Disconnected");
        }
    }

    /// Re-run discovery for the current link.
    ///
    /// Only valid in `Ready`. The registry is cleared first and no state
    /// transition occurs.
    pub async fn rediscover(&self) -> Result<DiscoveryReport> {
        let (generation, link) = {
            let active = self.inner.active();
            match active.as_ref() {
                Some(active) => (active.generation, Arc::clone(&active.link)),
                None => return Err(Error::NotConnected),
            }
        };
        if self.current_state() != SessionState::Ready
            || !self.inner.generations.is_current(generation)
        {
            return Err(Error::NotConnected);
        }
        self.inner.discover(generation, link.as_ref()).await
    }

    /// Watch the session state.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// The state right now.
    pub fn current_state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// The live generation.
    pub fn generation(&self) -> Generation {
        self.inner.generations.current()
    }

    /// The connected device, if any.
    pub fn device(&self) -> Option<Device> {
        self.inner.active().as_ref().map(|a| a.device.clone())
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.inner.bus
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn decoders(&self) -> &DecoderTable {
        &self.inner.decoders
    }

    /// The session's service registry.
    pub fn registry(&self) -> &SharedRegistry {
        &self.inner.registry
    }

    /// Snapshot of the discovered services; empty unless connected.
    pub async fn services(&self) -> Vec<ServiceEntry> {
        self.inner.registry.read().await.services()
    }

    /// Device Information strings cached during discovery.
    pub async fn device_info(&self) -> Option<DeviceInfo> {
        let registry = self.inner.registry.read().await;
        let text = |uuid| {
            let bytes = registry.cached_value(&uuid)?;
            match self.inner.decoders.decode(uuid, bytes).ok()? {
                DecodedSample::DeviceInfoString { text, .. } => Some(text),
                _ => None,
            }
        };
        let info = DeviceInfo {
            manufacturer: text(MANUFACTURER_NAME),
            model: text(MODEL_NUMBER),
            serial: text(SERIAL_NUMBER),
        };
        (!info.is_empty()).then_some(info)
    }

    /// Battery level cached during discovery.
    pub async fn battery_level(&self) -> Option<u8> {
        let registry = self.inner.registry.read().await;
        let bytes = registry.cached_value(&BATTERY_LEVEL)?;
        match self.inner.decoders.decode(BATTERY_LEVEL, bytes).ok()? {
            DecodedSample::BatteryLevel { percent } => Some(percent),
            _ => None,
        }
    }
}

impl<C: Central> Inner<C> {
    fn active(&self) -> MutexGuard<'_, Option<ActiveLink<C::Link>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn establish(
        self: &Arc<Self>,
        generation: Generation,
        selector: &DeviceSelector,
    ) -> Result<Device> {
        let config = &self.config;

        debug!("Selecting device");
        let link = match timeout(config.selection_timeout, self.central.select(selector)).await {
            Ok(Ok(link)) => Arc::new(link),
            Ok(Err(e)) => return Err(ConnectError::from_platform(&e).into()),
            Err(_) => {
                return Err(Error::connect(
                    ErrorKind::DeviceNotFound,
                    format!("no device selected within {:?}", config.selection_timeout),
                ));
            }
        };
        let device = link.device();
        if !self.generations.is_current(generation) {
            return Err(Error::Cancelled);
        }

        info!(%device, "Connecting");
        match timeout(config.connect_timeout, link.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ConnectError::from_platform(&e).into()),
            Err(_) => {
                unlink_in_background(Arc::clone(&link));
                return Err(Error::connect(
                    ErrorKind::TransportUnavailable,
                    format!("link not established within {:?}", config.connect_timeout),
                ));
            }
        }

        let events = match link.events().await {
            Ok(events) => events,
            Err(e) => {
                unlink(link.as_ref()).await;
                return Err(ConnectError::from_platform(&e).into());
            }
        };

        let cancel = CancellationToken::new();
        let stored = {
            let mut active = self.active();
            if self.generations.is_current(generation) {
                *active = Some(ActiveLink {
                    generation,
                    link: Arc::clone(&link),
                    device: device.clone(),
                    cancel: cancel.clone(),
                });
                true
            } else {
                false
            }
        };
        if !stored {
            unlink(link.as_ref()).await;
            return Err(Error::Cancelled);
        }

        if !self.transition(generation, SessionState::Connecting, SessionState::Discovering) {
            return Err(Error::Cancelled);
        }
        self.bus.publish(&SessionEvent::Connected {
            device: device.clone(),
            generation,
        });

        tokio::spawn(run_pump(
            Arc::downgrade(self),
            generation,
            events,
            cancel,
        ));

        match self.discover(generation, link.as_ref()).await {
            Ok(_) | Err(Error::Timeout { .. }) => {}
            Err(e) => return Err(e),
        }

        if !self.transition(generation, SessionState::Discovering, SessionState::Ready) {
            return Err(Error::Cancelled);
        }
        let services = self.registry.read().await.len();
        self.bus.publish(&SessionEvent::Ready {
            device: device.clone(),
            generation,
            services,
        });
        info!(%device, services, "Session ready");

        Ok(device)
    }

    /// Move `from → to` if the state and generation still match.
    fn transition(&self, generation: Generation, from: SessionState, to: SessionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from && self.generations.is_current(generation) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    async fn discover(&self, generation: Generation, link: &C::Link) -> Result<DiscoveryReport> {
        let walk = discover_all(
            &self.registry,
            link,
            generation,
            self.config.read_timeout,
            |characteristic, value| {
                if self.generations.is_current(generation) {
                    self.publish_value(characteristic.uuid, value);
                }
            },
        );

        match timeout(self.config.discovery_timeout, walk).await {
            Ok(Ok(report)) => {
                info!(
                    services = report.services,
                    characteristics = report.characteristics,
                    reads = report.reads,
                    subscriptions = report.subscriptions,
                    failures = report.failures.len(),
                    "Discovery complete"
                );
                for failure in &report.failures {
                    let stage = match failure.stage {
                        DiscoveryStage::Services => "enumerate services",
                        DiscoveryStage::Characteristics => "enumerate characteristics",
                        DiscoveryStage::Read => "read",
                        DiscoveryStage::Subscribe => "subscribe",
                    };
                    self.bus.publish(&SessionEvent::issue(
                        IssueCategory::Discovery,
                        failure.characteristic,
                        format!("{stage} failed: {}", failure.message),
                    ));
                }
                Ok(report)
            }
            Ok(Err(stale)) => {
                debug!("Discovery abandoned: {}", stale);
                Err(Error::Cancelled)
            }
            Err(_) => {
                let duration = self.config.discovery_timeout;
                warn!("Discovery timed out after {:?}", duration);
                if self.generations.is_current(generation) {
                    self.bus.publish(&SessionEvent::issue(
                        IssueCategory::Discovery,
                        None,
                        format!("discovery timed out after {duration:?}"),
                    ));
                }
                Err(Error::timeout("discovery", duration))
            }
        }
    }

    fn publish_value(&self, characteristic: Uuid, value: &[u8]) {
        match self.decoders.decode(characteristic, value) {
            Ok(sample) => {
                self.bus
                    .publish(&SessionEvent::sample_from(characteristic, sample));
            }
            Err(e) => {
                warn!("Failed to decode {}: {}", display_uuid(&characteristic), e);
                self.bus.publish(&SessionEvent::issue(
                    IssueCategory::Decode,
                    Some(characteristic),
                    e.to_string(),
                ));
            }
        }
    }

    /// Return to `Disconnected`, unless already there.
    ///
    /// With `expected` set, only tears down if that generation is still live.
    /// Returns whether a transition happened.
    async fn teardown(&self, expected: Option<Generation>, reason: DisconnectReason) -> bool {
        let mut ended = None;
        self.state.send_if_modified(|state| {
            if *state == SessionState::Disconnected {
                return false;
            }
            let live = self.generations.current();
            if expected.is_some_and(|g| g != live) {
                return false;
            }
            self.generations.advance();
            ended = Some(live);
            *state = SessionState::Disconnected;
            true
        });
        let Some(ended) = ended else {
            return false;
        };

        let active = self.active().take_if(|a| a.generation == ended);
        let device = active.as_ref().map(|a| a.device.clone());
        if let Some(active) = active {
            active.cancel.cancel();
            unlink(active.link.as_ref()).await;
        }
        self.registry.write().await.clear_stale();

        debug!(generation = %ended, ?reason, "Torn down");
        self.bus.publish(&SessionEvent::Disconnected {
            device,
            reason,
            generation: ended,
        });
        true
    }
}

impl<C: Central> Drop for Inner<C> {
    fn drop(&mut self) {
        let active = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(active) = active {
            warn!(
                device = %active.device,
                "Session dropped while connected - performing best-effort cleanup. \
                 Call disconnect().await before dropping."
            );
            active.cancel.cancel();
            unlink_in_background(active.link);
        }
    }
}

async fn unlink<L: GattLink + ?Sized>(link: &L) {
    if let Err(e) = link.disconnect().await {
        warn!("Unlink failed (ignored): {}", e);
    }
}

fn unlink_in_background<L: GattLink>(link: Arc<L>) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            unlink(link.as_ref()).await;
        });
    }
}

/// Forward notifications of one link into the session until cancelled.
///
/// Notifications are decoded and published only while `generation` is live.
/// A link-loss signal, or the stream ending without cancellation, tears the
/// session down exactly as `disconnect()` would.
async fn run_pump<C: Central>(
    session: Weak<Inner<C>>,
    generation: Generation,
    mut events: BoxStream<'static, LinkEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%generation, "Notification pump cancelled");
                break;
            }
            event = events.next() => {
                let Some(inner) = session.upgrade() else {
                    break;
                };
                match event {
                    Some(LinkEvent::Notification { characteristic, value }) => {
                        if !inner.generations.is_current(generation) {
                            break;
                        }
                        inner.publish_value(characteristic, &value);
                    }
                    Some(LinkEvent::Disconnected) | None => {
                        if !cancel.is_cancelled() {
                            warn!(%generation, "Link lost");
                            inner.teardown(Some(generation), DisconnectReason::LinkLost).await;
                        }
                        break;
                    }
                }
            }
        }
    }
}
