//! Raw event recording.
//!
//! An [`EventObserver`] subscribes one listener per event name and appends
//! every delivered event to a private buffer, in arrival order. It does not
//! filter, transform or deduplicate.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::session::{EventCallback, Session};

// ============================================================================
// ObservedEvent
// ============================================================================

/// One recorded protocol notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedEvent {
    /// Event name, e.g. `Network.responseReceived`.
    pub method: String,

    /// Event params as delivered.
    pub params: Value,
}

impl ObservedEvent {
    /// Creates a recorded event.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Returns `params.requestId` if present.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.params.get("requestId").and_then(Value::as_str)
    }

    /// Returns `params.response` if it is an object.
    #[inline]
    #[must_use]
    pub fn response(&self) -> Option<&Value> {
        self.params.get("response").filter(|response| response.is_object())
    }
}

// ============================================================================
// EventObserver
// ============================================================================

struct ObserverBuffer {
    events: Vec<ObservedEvent>,
    closed: bool,
}

/// Records a fixed set of events from a session until stopped.
pub struct EventObserver<S: Session> {
    session: Arc<S>,
    buffer: Arc<Mutex<ObserverBuffer>>,
    subscriptions: Vec<(String, SubscriptionId)>,
}

impl<S: Session> fmt::Debug for EventObserver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventObserver")
            .field("events", &self.subscriptions.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("buffered", &self.len())
            .finish_non_exhaustive()
    }
}

impl<S: Session> EventObserver<S> {
    /// Subscribes to every name in `event_names`.
    ///
    /// Duplicate names are subscribed once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `event_names` is empty.
    pub fn observe<I, N>(session: &Arc<S>, event_names: I) -> Result<Self>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let mut seen = FxHashSet::default();
        let mut names: Vec<String> = Vec::new();
        for name in event_names {
            let name = name.as_ref();
            if seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
        }

        if names.is_empty() {
            return Err(Error::invalid_argument(
                "an event observer needs at least one event name",
            ));
        }

        let buffer = Arc::new(Mutex::new(ObserverBuffer {
            events: Vec::new(),
            closed: false,
        }));

        let subscriptions = names
            .into_iter()
            .map(|name| {
                let callback = Self::recorder(&buffer, &name);
                let id = session.on(&name, callback);
                (name, id)
            })
            .collect::<Vec<_>>();

        debug!(events = subscriptions.len(), "Event observer attached");

        Ok(Self {
            session: Arc::clone(session),
            buffer,
            subscriptions,
        })
    }

    /// Returns the number of events recorded so far.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.lock().events.len()
    }

    /// Returns `true` if nothing was recorded yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detaches every listener and returns the recorded events.
    ///
    /// Events arriving after this call are not recorded.
    #[must_use]
    pub fn stop(mut self) -> Vec<ObservedEvent> {
        self.detach();

        let mut buffer = self.buffer.lock();
        buffer.closed = true;
        let events = std::mem::take(&mut buffer.events);

        debug!(count = events.len(), "Event observer stopped");
        events
    }

    fn recorder(buffer: &Arc<Mutex<ObserverBuffer>>, name: &str) -> EventCallback {
        let buffer = Arc::clone(buffer);
        let method = name.to_string();

        Arc::new(move |params: &Value| {
            let mut buffer = buffer.lock();
            if !buffer.closed {
                buffer
                    .events
                    .push(ObservedEvent::new(method.clone(), params.clone()));
            }
        })
    }

    fn detach(&mut self) {
        for (name, id) in self.subscriptions.drain(..) {
            self.session.off(&name, id);
        }
    }
}

impl<S: Session> Drop for EventObserver<S> {
    fn drop(&mut self) {
        self.detach();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    use crate::session::testing::MockSession;

    const NAMES: &[&str] = &["Page.loadEventFired", "Page.frameAttached", "Network.dataReceived"];

    #[test]
    fn test_records_in_arrival_order() {
        let session = Arc::new(MockSession::new());
        let observer = EventObserver::observe(&session, &NAMES[..2]).expect("observe");

        session.emit("Page.frameAttached", json!({"frameId": "A"}));
        session.emit("Network.dataReceived", json!({"dataLength": 10}));
        session.emit("Page.loadEventFired", json!({"timestamp": 1.5}));
        session.emit("Page.frameAttached", json!({"frameId": "B"}));
        assert_eq!(observer.len(), 3);

        let events = observer.stop();
        let methods: Vec<_> = events.iter().map(|e| e.method.as_str()).collect();
        assert_eq!(
            methods,
            vec!["Page.frameAttached", "Page.loadEventFired", "Page.frameAttached"]
        );
        assert_eq!(events[2].params, json!({"frameId": "B"}));
    }

    #[test]
    fn test_stop_detaches_only_own_listeners() {
        let session = Arc::new(MockSession::new());
        let first = EventObserver::observe(&session, ["Page.loadEventFired"]).expect("observe");
        let second = EventObserver::observe(&session, ["Page.loadEventFired"]).expect("observe");
        assert_eq!(session.listener_count("Page.loadEventFired"), 2);

        let stopped = first.stop();
        assert!(stopped.is_empty());

        session.emit("Page.loadEventFired", json!({}));
        assert_eq!(session.listener_count("Page.loadEventFired"), 1);
        assert_eq!(second.stop().len(), 1);
        assert!(!session.has_listeners());
    }

    #[test]
    fn test_duplicate_names_subscribe_once() {
        let session = Arc::new(MockSession::new());
        let observer = EventObserver::observe(
            &session,
            ["Page.loadEventFired", "Page.loadEventFired"],
        )
        .expect("observe");

        session.emit("Page.loadEventFired", json!({}));
        assert_eq!(observer.stop().len(), 1);
    }

    #[test]
    fn test_interleaved_duplicates_keep_first_order() {
        let session = Arc::new(MockSession::new());
        let names = ["A", "B", "A", "C", "B", "C", "A"];
        let observer = EventObserver::observe(&session, names).expect("observe");

        for name in ["A", "B", "C"] {
            assert_eq!(session.listener_count(name), 1);
        }
        for name in ["C", "A", "B"] {
            session.emit(name, json!({}));
        }

        let methods: Vec<String> = observer.stop().into_iter().map(|e| e.method).collect();
        assert_eq!(methods, ["C", "A", "B"]);
        assert!(!session.has_listeners());
    }

    #[test]
    fn test_empty_name_set_rejected() {
        let session = Arc::new(MockSession::new());
        let result = EventObserver::observe(&session, Vec::<String>::new());
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn test_drop_detaches() {
        let session = Arc::new(MockSession::new());
        {
            let _observer = EventObserver::observe(&session, NAMES).expect("observe");
            assert!(session.has_listeners());
        }
        assert!(!session.has_listeners());
    }

    #[test]
    fn test_observed_event_accessors() {
        let event = ObservedEvent::new(
            "Network.responseReceived",
            json!({"requestId": "9.1", "response": {"status": 200}}),
        );
        assert_eq!(event.request_id(), Some("9.1"));
        assert!(event.response().is_some());

        let bare = ObservedEvent::new("Network.dataReceived", json!({"response": "nope"}));
        assert_eq!(bare.request_id(), None);
        assert!(bare.response().is_none());
    }

    proptest! {
        #[test]
        fn prop_buffer_matches_deliveries(
            deliveries in prop::collection::vec((0usize..4, any::<u32>()), 0..64),
            subscribed in prop::sample::subsequence(NAMES.to_vec(), 1..=NAMES.len()),
        ) {
            let session = Arc::new(MockSession::new());
            let observer = EventObserver::observe(&session, &subscribed).expect("observe");

            let all_names = [NAMES[0], NAMES[1], NAMES[2], "Network.loadingFailed"];
            let mut expected = Vec::new();
            for (index, n) in &deliveries {
                let name = all_names[*index];
                let params = json!({ "n": n });
                session.emit(name, params.clone());
                if subscribed.contains(&name) {
                    expected.push(ObservedEvent::new(name, params));
                }
            }

            let recorded = observer.stop();
            session.emit(NAMES[0], json!({ "late": true }));

            prop_assert_eq!(recorded, expected);
            prop_assert!(!session.has_listeners());
        }
    }
}
