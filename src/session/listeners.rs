//! Listener registry keyed by event name.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::identifiers::SubscriptionId;

use super::EventCallback;

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Ordered listeners per event name.
///
/// Listeners for the same event run in registration order. Dispatch copies
/// the matching callbacks out of the lock first, so a callback may register
/// or remove listeners without deadlocking.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<FxHashMap<String, Vec<(SubscriptionId, EventCallback)>>>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener and returns its subscription ID.
    pub fn add(&self, event: &str, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId::generate();
        self.listeners
            .write()
            .entry(event.to_string())
            .or_default()
            .push((id, callback));

        trace!(event, %id, "Listener added");
        id
    }

    /// Removes one listener. Returns `false` if it was not registered.
    pub fn remove(&self, event: &str, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(event) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            listeners.remove(event);
        }

        trace!(event, %id, removed, "Listener removed");
        removed
    }

    /// Invokes every listener of `event` with `params`.
    ///
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, event: &str, params: &Value) -> usize {
        let callbacks = self.callbacks(event);
        for callback in &callbacks {
            callback(params);
        }

        callbacks.len()
    }

    /// Returns a copy of the listeners of `event`, in registration order.
    ///
    /// Removing a listener does not affect copies already taken.
    #[must_use]
    pub fn callbacks(&self, event: &str) -> Vec<EventCallback> {
        self.listeners
            .read()
            .get(event)
            .map(|entries| entries.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default()
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Returns the number of listeners for `event`.
    #[inline]
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }

    /// Returns `true` if no listener is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
