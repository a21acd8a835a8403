//! Notification bus: synchronous fan-out of notification texts to observers.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

/// Receives every notification published on the bus.
pub trait Observer: Send + Sync {
    fn notify(&self, message: &str);
}

impl<F> Observer for F
where
    F: Fn(&str) + Send + Sync,
{
    fn notify(&self, message: &str) {
        self(message)
    }
}

/// Forwards notifications to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn notify(&self, message: &str) {
        info!(target: "yap_bank::log", "{message}");
    }
}

/// Fan-out of notifications to subscribers, in subscription order.
///
/// Publishing is serialized: the subscriber list stays locked for the whole
/// delivery, so observers must not subscribe from inside `notify`.
/// A panicking observer is isolated and logged; delivery continues with the
/// next one.
#[derive(Default)]
pub struct NotificationBus {
    observers: Mutex<Vec<Arc<dyn Observer>>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn subscribers(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `message` to every subscriber. Returns how many observers failed.
    pub fn publish(&self, message: &str) -> usize {
        let observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut failed = 0;
        for (idx, observer) in observers.iter().enumerate() {
            if panic::catch_unwind(AssertUnwindSafe(|| observer.notify(message))).is_err() {
                warn!(observer = idx, message, "observer panicked, skipping it");
                failed += 1;
            }
        }
        failed
    }
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.subscribers())
            .finish()
    }
}
