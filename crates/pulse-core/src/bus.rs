//! In-process publish/subscribe for session events.
//!
//! Callback subscribers are invoked synchronously, in subscription order, on
//! the publishing task. A subscriber that returns an error or panics is logged
//! and skipped; delivery to the remaining subscribers continues and the
//! publisher never observes the failure.
//!
//! The subscriber list is copy-on-write: `publish` iterates a snapshot, so
//! subscribing or unsubscribing during delivery only affects later publishes.
//!
//! Async consumers can use [`NotificationBus::receiver`], which yields the same
//! events through a `tokio::sync::broadcast` channel.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio::sync::broadcast;
use tracing::warn;

use crate::events::SessionEvent;

/// Error type returned by subscriber callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Callback = Arc<dyn Fn(&SessionEvent) -> Result<(), BoxError> + Send + Sync>;

/// Default capacity of the broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

struct BusInner {
    subscribers: RwLock<Arc<Vec<(u64, Callback)>>>,
    next_id: AtomicU64,
    sender: broadcast::Sender<SessionEvent>,
}

/// Event bus handle. Clones share the same subscribers.
#[derive(Clone)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl NotificationBus {
    /// Create a bus whose broadcast channel holds `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(Arc::new(Vec::new())),
                next_id: AtomicU64::new(1),
                sender,
            }),
        }
    }

    /// Register a callback for every subsequently published event.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SessionEvent) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::clone(&guard);
        next.push((id, Arc::new(callback)));
        *guard = Arc::new(next);

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Receive events asynchronously.
    ///
    /// A receiver that falls more than the channel capacity behind observes
    /// `RecvError::Lagged`.
    pub fn receiver(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.sender.subscribe()
    }

    /// Deliver `event` to every current subscriber.
    pub fn publish(&self, event: &SessionEvent) {
        let snapshot = Arc::clone(
            &self
                .inner
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for (id, callback) in snapshot.iter() {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(subscriber = id, event = event.name(), "Subscriber failed: {}", e);
                }
                Err(_) => {
                    warn!(subscriber = id, event = event.name(), "Subscriber panicked");
                }
            }
        }

        // No receivers is not an error
        let _ = self.inner.sender.send(event.clone());
    }

    /// Number of callback subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of broadcast receivers.
    pub fn receiver_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.subscriber_count())
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

/// Handle returned by [`NotificationBus::subscribe`].
///
/// Dropping the handle leaves the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Remove the callback. Takes effect for subsequent publishes.
    pub fn unsubscribe(self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let mut guard = bus
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.iter().any(|(id, _)| *id == self.id) {
            let next: Vec<_> = guard
                .iter()
                .filter(|(id, _)| *id != self.id)
                .cloned()
                .collect();
            *guard = Arc::new(next);
        }
    }

    /// Subscriber identifier used in log output.
    pub fn id(&self) -> u64 {
        self.id
    }
}
