//! Subscriber registry for inbound event fan-out.
//!
//! Maps an event-type string to an ordered list of callbacks. Delivery
//! order is registration order; removal is by `Arc` pointer identity. A
//! panicking callback is isolated so it cannot prevent delivery to the
//! callbacks registered after it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use smallvec::SmallVec;

/// Callback invoked with the payload of a matching envelope.
pub type EventCallback = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Wrap a closure into an [`EventCallback`].
pub fn callback<F>(f: F) -> EventCallback
where
    F: Fn(serde_json::Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-client registry of event subscribers.
///
/// Owned exclusively by the client; consumers only ever see the `on`/`off`
/// surface, never the registry itself.
#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: DashMap<String, SmallVec<[EventCallback; 2]>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Register a callback for an event type. Multiple callbacks per type
    /// are allowed and are invoked in registration order.
    pub fn on(&self, event_type: &str, callback: EventCallback) {
        self.handlers
            .entry(event_type.to_string())
            .or_default()
            .push(callback);

        tracing::debug!(event_type = %event_type, "Subscriber registered");
    }

    /// Unregister a callback by identity. Removing a callback that was
    /// never registered is a silent no-op. Returns whether a callback
    /// was actually removed.
    pub fn off(&self, event_type: &str, callback: &EventCallback) -> bool {
        let mut removed = false;
        if let Some(mut entry) = self.handlers.get_mut(event_type) {
            let before = entry.len();
            entry.retain(|registered| !Arc::ptr_eq(registered, callback));
            removed = entry.len() < before;
            if entry.is_empty() {
                drop(entry);
                self.handlers.remove(event_type);
            }
        }

        if removed {
            tracing::debug!(event_type = %event_type, "Subscriber unregistered");
        }
        removed
    }

    /// Invoke every callback registered for `event_type`, in registration
    /// order, isolating panics per callback. Returns the number of
    /// callbacks invoked.
    pub fn dispatch(&self, event_type: &str, payload: &serde_json::Value) -> usize {
        // Snapshot the list so callbacks can re-enter on/off without
        // holding a registry lock.
        let callbacks: Vec<EventCallback> = match self.handlers.get(event_type) {
            Some(entry) => entry.iter().cloned().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for callback in &callbacks {
            let result = catch_unwind(AssertUnwindSafe(|| callback(payload.clone())));
            if result.is_err() {
                tracing::error!(event_type = %event_type, "Subscriber callback panicked");
            }
            delivered += 1;
        }
        delivered
    }

    /// Number of callbacks currently registered for an event type.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers
            .get(event_type)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }
}
