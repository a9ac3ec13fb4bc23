//! Trait abstractions over sample producers.
//!
//! [`SampleSource`] lets consumers such as the CLI's `watch` command treat a
//! real [`DeviceSession`] and a [`SyntheticSource`](crate::SyntheticSource)
//! the same way: both publish [`SessionEvent`](crate::SessionEvent)s on a
//! [`NotificationBus`] and expose their state through a watch channel.

use async_trait::async_trait;
use tokio::sync::watch;

use pulse_types::{Device, SessionState};

use crate::bus::NotificationBus;
use crate::link::Central;
use crate::session::DeviceSession;

/// Anything that publishes telemetry events on a bus.
///
/// # Example
///
/// ```ignore
/// use pulse_core::SampleSource;
///
/// async fn count_events<S: SampleSource>(source: &S) {
///     let mut rx = source.bus().receiver();
///     while let Ok(event) = rx.recv().await {
///         println!("{}", event.name());
///     }
/// }
/// ```
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// The bus events are published on.
    fn bus(&self) -> &NotificationBus;

    /// Watch the source's state.
    fn state(&self) -> watch::Receiver<SessionState>;

    /// The device the source speaks for, if connected.
    fn device(&self) -> Option<Device>;

    /// Stop producing events and return to `Disconnected`.
    async fn shutdown(&self);
}

#[async_trait]
impl<C: Central> SampleSource for DeviceSession<C> {
    fn bus(&self) -> &NotificationBus {
        DeviceSession::bus(self)
    }

    fn state(&self) -> watch::Receiver<SessionState> {
        DeviceSession::state(self)
    }

    fn device(&self) -> Option<Device> {
        DeviceSession::device(self)
    }

    async fn shutdown(&self) {
        self.disconnect().await;
    }
}
