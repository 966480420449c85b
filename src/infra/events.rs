//! Publish/subscribe registry for typed notifications
//!
//! Each notification kind gets its own [`EventHub`]. Callbacks are
//! invoked synchronously in registration order; a panicking callback is
//! caught and logged so one bad subscriber cannot take down a receive
//! loop. Cancellation is explicit unsubscription.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned from [`EventHub::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A registry of callbacks for one notification kind.
pub struct EventHub<T> {
    subscribers: Arc<Mutex<Vec<(SubscriptionId, Callback<T>)>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for EventHub<T> {
    fn clone(&self) -> Self {
        Self { subscribers: self.subscribers.clone(), next_id: self.next_id.clone() }
    }
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventHub<T> {
    pub fn new() -> Self {
        Self { subscribers: Arc::new(Mutex::new(Vec::new())), next_id: Arc::new(AtomicU64::new(1)) }
    }

    /// Register a callback. Callbacks run on the publisher's task.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns false if the id was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    /// Invoke all callbacks in registration order. The lock is released
    /// before invocation so callbacks may subscribe or unsubscribe.
    pub fn publish(&self, value: &T) {
        let snapshot: Vec<Callback<T>> =
            self.subscribers.lock().iter().map(|(_, cb)| cb.clone()).collect();

        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                error!("event_subscriber_panicked");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
