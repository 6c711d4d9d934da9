//! Typed publish/subscribe for completed recordings.
//!
//! Delivery is synchronous, in registration order, on the publishing
//! thread. One faulting subscriber never starves the rest, and an event
//! with no subscribers is simply dropped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::audio::{CaptureStats, Clip};

/// Event payload delivered to every subscriber when a session finalizes.
#[derive(Debug, Clone)]
pub struct RecordingCompleted {
    pub clip: Clip,
    pub stats: CaptureStats,
}

pub type SubscriberId = String;

type Callback = Box<dyn Fn(&RecordingCompleted) -> anyhow::Result<()> + Send + Sync>;

struct Subscriber {
    id: SubscriberId,
    callback: Callback,
}

/// One isolated delivery failure, reported alongside the rest.
#[derive(Debug)]
pub struct CallbackFailure {
    pub subscriber: SubscriberId,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct PublishReport {
    pub delivered: usize,
    pub failures: Vec<CallbackFailure>,
}

/// Registration-ordered listener registry, shared between the control
/// surface (subscribe/unsubscribe) and the coordinator thread (publish).
#[derive(Clone, Default)]
pub struct EventNotifier {
    subscribers: Arc<Mutex<Vec<Arc<Subscriber>>>>,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-subscribing an existing id swaps the callback in place, keeping
    /// its position in delivery order.
    pub fn subscribe<F>(&self, id: impl Into<SubscriberId>, callback: F)
    where
        F: Fn(&RecordingCompleted) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = id.into();
        let subscriber = Arc::new(Subscriber {
            id: id.clone(),
            callback: Box::new(callback),
        });
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        match subscribers.iter_mut().find(|s| s.id == id) {
            Some(slot) => *slot = subscriber,
            None => subscribers.push(subscriber),
        }
    }

    /// Returns true if the id was registered.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Deliver to every subscriber in registration order. Erroring and
    /// panicking callbacks are isolated and reported independently.
    pub fn publish(&self, event: &RecordingCompleted) -> PublishReport {
        // Snapshot outside the callbacks so a listener may re-enter
        // subscribe/unsubscribe without deadlocking.
        let snapshot: Vec<Arc<Subscriber>> = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        if snapshot.is_empty() {
            debug!("no subscribers registered; dropping event");
            return PublishReport::default();
        }

        let mut report = PublishReport::default();
        for subscriber in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(event)));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    warn!(subscriber = %subscriber.id, error = %err, "recording listener failed");
                    report.failures.push(CallbackFailure {
                        subscriber: subscriber.id.clone(),
                        reason: format!("{err:#}"),
                    });
                }
                Err(panic) => {
                    let reason = panic_reason(panic.as_ref());
                    warn!(subscriber = %subscriber.id, reason, "recording listener panicked");
                    report.failures.push(CallbackFailure {
                        subscriber: subscriber.id.clone(),
                        reason,
                    });
                }
            }
        }
        report
    }
}

fn panic_reason(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "listener panicked".to_string()
    }
}
