//! Observers of accepted real-time logs.
//!
//! Notifications go out only after the saver controller accepted the pack.
//! Two delivery styles are supported:
//! - [`LogObserver`] callbacks, run inline on the thread that processed the pack
//! - channel subscribers, for consumers living on their own thread
//!
//! ```rust
//! use das_log_protocol::{LogBatch, LogKind};
//! use das_log_sync::{LogNotification, ObserverRegistry};
//!
//! let registry = ObserverRegistry::new();
//! let receiver = registry.subscribe();
//!
//! registry.notify(&LogNotification::new(3, LogBatch::empty(LogKind::Event)));
//! assert_eq!(receiver.recv().unwrap().scheme_id, 3);
//! ```

use das_log_protocol::{LogBatch, LogKind};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Accepted real-time logs of one kind for one tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct LogNotification {
    /// Tenant the logs belong to.
    pub scheme_id: u32,
    /// The logs, tenant already stamped.
    pub batch: LogBatch,
}

impl LogNotification {
    /// Creates a notification.
    pub fn new(scheme_id: u32, batch: LogBatch) -> Self {
        Self { scheme_id, batch }
    }

    /// Kind of the logs.
    pub fn kind(&self) -> LogKind {
        self.batch.kind()
    }
}

/// Callback receiving accepted real-time logs.
pub trait LogObserver: Send + Sync {
    /// Called once per accepted pack. Must not block.
    fn on_logs(&self, notification: &LogNotification);
}

/// Handle returned by [`ObserverRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Distributes notifications to callbacks and channel subscribers.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<Vec<(ObserverId, Arc<dyn LogObserver>)>>,
    subscribers: RwLock<Vec<Sender<LogNotification>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observer_count())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ObserverRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback.
    pub fn register(&self, observer: Arc<dyn LogObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Removes a callback. Returns false if it was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(registered, _)| *registered != id);
        observers.len() != before
    }

    /// Subscribes a channel. Dropping the receiver unsubscribes it.
    pub fn subscribe(&self) -> Receiver<LogNotification> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Delivers a notification to every callback and live subscriber.
    pub fn notify(&self, notification: &LogNotification) {
        let observers: Vec<Arc<dyn LogObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer.on_logs(notification);
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
    }

    /// Number of registered callbacks.
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Number of channel subscribers seen alive at the last notification.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
