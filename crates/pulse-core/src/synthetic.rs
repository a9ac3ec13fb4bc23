//! Synthetic telemetry without a radio.
//!
//! [`SyntheticSource`] publishes the same [`SessionEvent`] shapes as a
//! [`DeviceSession`](crate::DeviceSession) on timers, so consumers can be
//! exercised end to end without hardware. Heart rate, steps, SpO₂ and battery
//! samples are generated at independent intervals.
//!
//! # Example
//!
//! ```no_run
//! use pulse_core::{SampleSource, SyntheticOptions, SyntheticSource};
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = SyntheticSource::new(SyntheticOptions::default().seed(7));
//!     let mut rx = source.bus().receiver();
//!     source.start().await;
//!     while let Ok(event) = rx.recv().await {
//!         println!("{event:?}");
//!     }
//! }
//! ```

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use time::OffsetDateTime;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pulse_types::{DecodedSample, Device, HeartRateMeasurement, SessionState};

use crate::bus::{DEFAULT_EVENT_CAPACITY, NotificationBus};
use crate::events::{DisconnectReason, SessionEvent};
use crate::generation::GenerationCounter;
use crate::traits::SampleSource;

/// Identifier of the default synthetic device.
pub const SYNTHETIC_DEVICE_ID: &str = "synthetic-0";

/// Timer periods and seed for a [`SyntheticSource`].
#[derive(Debug, Clone)]
pub struct SyntheticOptions {
    /// Seed for reproducible output; OS entropy when unset.
    pub seed: Option<u64>,
    pub heart_rate_interval: Duration,
    pub steps_interval: Duration,
    pub spo2_interval: Duration,
    pub battery_interval: Duration,
    /// Device reported in lifecycle events.
    pub device: Device,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            seed: None,
            heart_rate_interval: Duration::from_secs(3),
            steps_interval: Duration::from_secs(10),
            spo2_interval: Duration::from_secs(15),
            battery_interval: Duration::from_secs(30),
            device: Device::new(SYNTHETIC_DEVICE_ID).with_name("Synthetic Wearable"),
        }
    }
}

impl SyntheticOptions {
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn heart_rate_interval(mut self, interval: Duration) -> Self {
        self.heart_rate_interval = interval;
        self
    }

    #[must_use]
    pub fn steps_interval(mut self, interval: Duration) -> Self {
        self.steps_interval = interval;
        self
    }

    #[must_use]
    pub fn spo2_interval(mut self, interval: Duration) -> Self {
        self.spo2_interval = interval;
        self
    }

    #[must_use]
    pub fn battery_interval(mut self, interval: Duration) -> Self {
        self.battery_interval = interval;
        self
    }

    #[must_use]
    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

/// Produces plausible wearable readings from a random source.
///
/// The slow sinusoidal drift is a function of wall-clock time so consecutive
/// samples trend rather than jump.
#[derive(Debug)]
pub struct SampleGenerator {
    rng: StdRng,
}

impl SampleGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }

    /// Heart rate around 72 bpm, clamped to 50..=180.
    pub fn heart_rate(&mut self, at: OffsetDateTime) -> HeartRateMeasurement {
        let t = unix_seconds(at);
        let variation = (t * 0.01).sin() * 15.0 + self.rng.random_range(0.0..10.0);
        let bpm = (72.0 + variation).round().clamp(50.0, 180.0) as u16;
        let energy_expended = self
            .rng
            .random_bool(0.5)
            .then(|| self.rng.random_range(0..100));

        HeartRateMeasurement {
            bpm,
            contact_detected: self.rng.random_bool(0.9),
            contact_supported: true,
            energy_expended,
            rr_intervals: Vec::new(),
            observed_at: at,
        }
    }

    pub fn steps(&mut self) -> DecodedSample {
        DecodedSample::Steps {
            count: 100 + self.rng.random_range(0..50),
            distance_km: self.rng.random_range(0.0..0.5),
            calories: self.rng.random_range(0..50),
        }
    }

    /// SpO₂ around 98 %, one decimal, clamped to 90..=100.
    pub fn oxygen_saturation(&mut self, at: OffsetDateTime) -> DecodedSample {
        let t = unix_seconds(at);
        let value = 98.0 + (t / 10.0).sin() * 2.0 + self.rng.random_range(0.0..1.0);
        let percent = ((value * 10.0).round() / 10.0).clamp(90.0, 100.0) as f32;
        DecodedSample::OxygenSaturation {
            percent,
            confidence: 70 + self.rng.random_range(0..30),
        }
    }

    /// Battery between 60 and 99 %.
    pub fn battery(&mut self) -> DecodedSample {
        DecodedSample::BatteryLevel {
            percent: 60 + self.rng.random_range(0..40),
        }
    }
}

fn unix_seconds(at: OffsetDateTime) -> f64 {
    at.unix_timestamp_nanos() as f64 / 1e9
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// A timer-driven stand-in for a connected wearable.
pub struct SyntheticSource {
    options: SyntheticOptions,
    bus: NotificationBus,
    state: watch::Sender<SessionState>,
    generations: GenerationCounter,
    running: Mutex<Option<Running>>,
}

impl SyntheticSource {
    pub fn new(options: SyntheticOptions) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            options,
            bus: NotificationBus::new(DEFAULT_EVENT_CAPACITY),
            state,
            generations: GenerationCounter::new(),
            running: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &SyntheticOptions {
        &self.options
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start the timers. A no-op while already running.
    ///
    /// Lifecycle events are published after the running flag is set and the
    /// lock released, so subscribers may query the source.
    pub async fn start(&self) {
        let (generation, go) = {
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            if running.is_some() {
                return;
            }
            let generation = self.generations.advance();
            let cancel = CancellationToken::new();
            let (go, gate) = oneshot::channel();
            let task = tokio::spawn(run_timers(
                self.options.clone(),
                self.bus.clone(),
                gate,
                cancel.clone(),
            ));
            *running = Some(Running { cancel, task });
            (generation, go)
        };

        let device = self.options.device.clone();
        self.state.send_replace(SessionState::Connecting);
        self.bus.publish(&SessionEvent::Connecting { generation });
        self.state.send_replace(SessionState::Discovering);
        self.bus.publish(&SessionEvent::Connected {
            device: device.clone(),
            generation,
        });
        self.state.send_replace(SessionState::Ready);
        self.bus.publish(&SessionEvent::Ready {
            device,
            generation,
            services: 0,
        });

        // Samples only follow `Ready`.
        let _ = go.send(());
        info!("Synthetic source started");
    }

    /// Stop the timers. A no-op while stopped.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.task.await {
            debug!("Synthetic timer task ended abnormally: {}", e);
        }

        let generation = self.generations.current();
        self.generations.advance();
        self.state.send_replace(SessionState::Disconnected);
        self.bus.publish(&SessionEvent::Disconnected {
            device: Some(self.options.device.clone()),
            reason: DisconnectReason::UserRequested,
            generation,
        });
        info!("Synthetic source stopped");
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        if let Some(running) = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            running.cancel.cancel();
        }
    }
}

#[async_trait]
impl SampleSource for SyntheticSource {
    fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn device(&self) -> Option<Device> {
        self.state
            .borrow()
            .is_connected()
            .then(|| self.options.device.clone())
    }

    async fn shutdown(&self) {
        self.stop().await;
    }
}

async fn run_timers(
    options: SyntheticOptions,
    bus: NotificationBus,
    gate: oneshot::Receiver<()>,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        opened = gate => {
            if opened.is_err() {
                return;
            }
        }
    }

    let mut generator = SampleGenerator::new(options.seed);
    let start = Instant::now();
    let mut heart_rate = interval_at(start + options.heart_rate_interval, options.heart_rate_interval);
    let mut steps = interval_at(start + options.steps_interval, options.steps_interval);
    let mut spo2 = interval_at(start + options.spo2_interval, options.spo2_interval);
    let mut battery = interval_at(start + options.battery_interval, options.battery_interval);
    for timer in [&mut heart_rate, &mut steps, &mut spo2, &mut battery] {
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }

    loop {
        let sample = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = heart_rate.tick() => {
                DecodedSample::HeartRate(generator.heart_rate(OffsetDateTime::now_utc()))
            }
            _ = steps.tick() => generator.steps(),
            _ = spo2.tick() => generator.oxygen_saturation(OffsetDateTime::now_utc()),
            _ = battery.tick() => generator.battery(),
        };
        bus.publish(&SessionEvent::Sample {
            characteristic: None,
            sample,
        });
    }
}
