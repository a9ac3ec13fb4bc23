//! Per-session cache of discovered services and characteristics.
//!
//! Every write carries the [`Generation`] under which it was produced and is
//! applied only if that generation is still live, checked under the same
//! write lock. Consumer reads see nothing unless the registry belongs to the
//! live generation. Together these keep results of a superseded or torn-down
//! connection from ever becoming visible.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use pulse_types::CharacteristicProperties;
use pulse_types::uuids::display_uuid;

use crate::generation::{Generation, GenerationCounter};
use crate::link::{GattCharacteristic, GattLink};

/// A write was attempted under a generation that is no longer live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stale generation {attempted} (live is {live})")]
pub struct StaleGeneration {
    pub attempted: Generation,
    pub live: Generation,
}

/// A discovered characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicEntry {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: CharacteristicProperties,
    /// Raw value from the discovery read, if it succeeded.
    pub last_value: Option<Vec<u8>>,
    /// Whether notifications were enabled.
    pub subscribed: bool,
}

/// A discovered primary service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub uuid: Uuid,
    pub characteristics: BTreeMap<Uuid, CharacteristicEntry>,
}

impl ServiceEntry {
    fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: BTreeMap::new(),
        }
    }
}

/// Service registry for one session.
#[derive(Debug)]
pub struct ServiceRegistry {
    live: GenerationCounter,
    generation: Generation,
    services: BTreeMap<Uuid, ServiceEntry>,
}

/// Registry shared between the session and its discovery walk.
pub type SharedRegistry = Arc<RwLock<ServiceRegistry>>;

impl ServiceRegistry {
    /// Create an empty registry fenced by `live`.
    pub fn new(live: GenerationCounter) -> Self {
        Self {
            live,
            generation: Generation::ZERO,
            services: BTreeMap::new(),
        }
    }

    /// Create a shared registry.
    pub fn shared(live: GenerationCounter) -> SharedRegistry {
        Arc::new(RwLock::new(Self::new(live)))
    }

    fn check(&self, generation: Generation) -> Result<(), StaleGeneration> {
        let live = self.live.current();
        if live == generation && self.generation == generation {
            Ok(())
        } else {
            Err(StaleGeneration {
                attempted: generation,
                live,
            })
        }
    }

    /// Start a walk for `generation`, discarding everything recorded so far.
    pub fn begin(&mut self, generation: Generation) -> Result<(), StaleGeneration> {
        let live = self.live.current();
        if live != generation {
            return Err(StaleGeneration {
                attempted: generation,
                live,
            });
        }
        self.services.clear();
        self.generation = generation;
        Ok(())
    }

    /// Record a primary service.
    pub fn insert_service(
        &mut self,
        generation: Generation,
        uuid: Uuid,
    ) -> Result<(), StaleGeneration> {
        self.check(generation)?;
        self.services
            .entry(uuid)
            .or_insert_with(|| ServiceEntry::new(uuid));
        Ok(())
    }

    /// Record a characteristic under its service.
    pub fn insert_characteristic(
        &mut self,
        generation: Generation,
        characteristic: &GattCharacteristic,
    ) -> Result<(), StaleGeneration> {
        self.check(generation)?;
        let service = self
            .services
            .entry(characteristic.service_uuid)
            .or_insert_with(|| ServiceEntry::new(characteristic.service_uuid));
        service
            .characteristics
            .entry(characteristic.uuid)
            .or_insert_with(|| CharacteristicEntry {
                uuid: characteristic.uuid,
                service_uuid: characteristic.service_uuid,
                properties: characteristic.properties,
                last_value: None,
                subscribed: false,
            });
        Ok(())
    }

    /// Cache the value read from a characteristic.
    pub fn record_value(
        &mut self,
        generation: Generation,
        characteristic: &GattCharacteristic,
        value: &[u8],
    ) -> Result<(), StaleGeneration> {
        self.check(generation)?;
        if let Some(entry) = self.entry_mut(characteristic) {
            entry.last_value = Some(value.to_vec());
        }
        Ok(())
    }

    /// Mark a characteristic as subscribed.
    pub fn mark_subscribed(
        &mut self,
        generation: Generation,
        characteristic: &GattCharacteristic,
    ) -> Result<(), StaleGeneration> {
        self.check(generation)?;
        if let Some(entry) = self.entry_mut(characteristic) {
            entry.subscribed = true;
        }
        Ok(())
    }

    fn entry_mut(&mut self, characteristic: &GattCharacteristic) -> Option<&mut CharacteristicEntry> {
        self.services
            .get_mut(&characteristic.service_uuid)?
            .characteristics
            .get_mut(&characteristic.uuid)
    }

    /// Discard all entries.
    pub fn clear(&mut self) {
        self.services.clear();
    }

    /// Discard all entries unless they belong to the live generation.
    ///
    /// Returns whether anything was discarded.
    pub fn clear_stale(&mut self) -> bool {
        if self.live.is_current(self.generation) || self.services.is_empty() {
            return false;
        }
        self.services.clear();
        true
    }

    /// Generation of the last walk.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Number of services held for `generation`, visible or not.
    pub fn entries_for(&self, generation: Generation) -> usize {
        if self.generation == generation {
            self.services.len()
        } else {
            0
        }
    }

    /// Whether the contents belong to the live generation.
    pub fn is_live(&self) -> bool {
        self.live.is_current(self.generation)
    }

    fn visible(&self) -> Option<&BTreeMap<Uuid, ServiceEntry>> {
        self.is_live().then_some(&self.services)
    }

    /// Snapshot of all services.
    pub fn services(&self) -> Vec<ServiceEntry> {
        self.visible()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up a service.
    pub fn service(&self, uuid: &Uuid) -> Option<&ServiceEntry> {
        self.visible()?.get(uuid)
    }

    /// Look up a characteristic in any service.
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&CharacteristicEntry> {
        self.visible()?
            .values()
            .find_map(|service| service.characteristics.get(uuid))
    }

    /// Cached value of a characteristic.
    pub fn cached_value(&self, uuid: &Uuid) -> Option<&[u8]> {
        self.characteristic(uuid)?.last_value.as_deref()
    }

    /// Number of visible services.
    pub fn len(&self) -> usize {
        self.visible().map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of visible characteristics across all services.
    pub fn characteristic_count(&self) -> usize {
        self.visible().map_or(0, |services| {
            services.values().map(|s| s.characteristics.len()).sum()
        })
    }
}

/// Stage of the discovery walk that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStage {
    Services,
    Characteristics,
    Read,
    Subscribe,
}

/// An isolated failure during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFailure {
    pub stage: DiscoveryStage,
    pub service: Option<Uuid>,
    pub characteristic: Option<Uuid>,
    pub message: String,
}

/// Outcome of a completed discovery walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub generation: Generation,
    pub services: usize,
    pub characteristics: usize,
    /// Successful reads.
    pub reads: usize,
    /// Successful subscriptions.
    pub subscriptions: usize,
    pub failures: Vec<DiscoveryFailure>,
}

impl DiscoveryReport {
    fn new(generation: Generation) -> Self {
        Self {
            generation,
            services: 0,
            characteristics: 0,
            reads: 0,
            subscriptions: 0,
            failures: Vec::new(),
        }
    }

    fn fail(
        &mut self,
        stage: DiscoveryStage,
        service: Option<Uuid>,
        characteristic: Option<Uuid>,
        message: impl Into<String>,
    ) {
        self.failures.push(DiscoveryFailure {
            stage,
            service,
            characteristic,
            message: message.into(),
        });
    }
}

/// Walk every primary service and characteristic of `link` into `registry`.
///
/// Services are walked outer, characteristics inner. Each readable
/// characteristic is read once and each notifiable one is subscribed; a failed
/// read or subscription is logged and recorded in the report without stopping
/// the walk. `on_value` observes every value that was committed to the
/// registry, after the lock is released.
///
/// # Errors
///
/// Returns [`StaleGeneration`] as soon as a write finds `generation` no longer
/// live; the rest of the walk is abandoned.
pub async fn discover_all<L, F>(
    registry: &SharedRegistry,
    link: &L,
    generation: Generation,
    op_timeout: Duration,
    mut on_value: F,
) -> Result<DiscoveryReport, StaleGeneration>
where
    L: GattLink + ?Sized,
    F: FnMut(&GattCharacteristic, &[u8]) + Send,
{
    registry.write().await.begin(generation)?;
    let mut report = DiscoveryReport::new(generation);

    let services = match tokio::time::timeout(op_timeout, link.primary_services()).await {
        Ok(Ok(services)) => services,
        Ok(Err(e)) => {
            warn!("Failed to enumerate services: {}", e);
            report.fail(DiscoveryStage::Services, None, None, e.to_string());
            return Ok(report);
        }
        Err(_) => {
            warn!("Enumerating services timed out after {:?}", op_timeout);
            report.fail(DiscoveryStage::Services, None, None, "timed out");
            return Ok(report);
        }
    };

    for service in services {
        registry.write().await.insert_service(generation, service)?;
        report.services += 1;
        debug!("Service {}", display_uuid(&service));

        let characteristics =
            match tokio::time::timeout(op_timeout, link.characteristics(service)).await {
                Ok(Ok(characteristics)) => characteristics,
                Ok(Err(e)) => {
                    warn!(
                        "Failed to enumerate characteristics of {}: {}",
                        display_uuid(&service),
                        e
                    );
                    report.fail(
                        DiscoveryStage::Characteristics,
                        Some(service),
                        None,
                        e.to_string(),
                    );
                    continue;
                }
                Err(_) => {
                    warn!(
                        "Enumerating characteristics of {} timed out",
                        display_uuid(&service)
                    );
                    report.fail(
                        DiscoveryStage::Characteristics,
                        Some(service),
                        None,
                        "timed out",
                    );
                    continue;
                }
            };

        for characteristic in characteristics {
            registry
                .write()
                .await
                .insert_characteristic(generation, &characteristic)?;
            report.characteristics += 1;
            debug!(
                "  Characteristic {} [{}]",
                display_uuid(&characteristic.uuid),
                characteristic.properties
            );

            if characteristic.properties.read {
                match tokio::time::timeout(op_timeout, link.read(&characteristic)).await {
                    Ok(Ok(value)) => {
                        registry
                            .write()
                            .await
                            .record_value(generation, &characteristic, &value)?;
                        report.reads += 1;
                        on_value(&characteristic, &value);
                    }
                    Ok(Err(e)) => {
                        warn!(
                            "Failed to read {}: {}",
                            display_uuid(&characteristic.uuid),
                            e
                        );
                        report.fail(
                            DiscoveryStage::Read,
                            Some(service),
                            Some(characteristic.uuid),
                            e.to_string(),
                        );
                    }
                    Err(_) => {
                        warn!(
                            "Reading {} timed out after {:?}",
                            display_uuid(&characteristic.uuid),
                            op_timeout
                        );
                        report.fail(
                            DiscoveryStage::Read,
                            Some(service),
                            Some(characteristic.uuid),
                            "timed out",
                        );
                    }
                }
            }

            if characteristic.properties.notify {
                match tokio::time::timeout(op_timeout, link.subscribe(&characteristic)).await {
                    Ok(Ok(())) => {
                        registry
                            .write()
                            .await
                            .mark_subscribed(generation, &characteristic)?;
                        report.subscriptions += 1;
                    }
                    Ok(Err(e)) => {
                        warn!(
                            "Failed to subscribe to {}: {}",
                            display_uuid(&characteristic.uuid),
                            e
                        );
                        report.fail(
                            DiscoveryStage::Subscribe,
                            Some(service),
                            Some(characteristic.uuid),
                            e.to_string(),
                        );
                    }
                    Err(_) => {
                        warn!(
                            "Subscribing to {} timed out",
                            display_uuid(&characteristic.uuid)
                        );
                        report.fail(
                            DiscoveryStage::Subscribe,
                            Some(service),
                            Some(characteristic.uuid),
                            "timed out",
                        );
                    }
                }
            }
        }
    }

    Ok(report)
}
