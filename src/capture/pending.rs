//! Registry of in-flight response body fetches.
//!
//! Every fetch gets a oneshot channel the moment it is registered, so the
//! merge step can await all of them without polling. Fetches for HTML
//! documents are parked until their `loadingFinished` arrives.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::identifiers::RequestId;

// ============================================================================
// Types
// ============================================================================

/// Fetched bodies by request ID. Failed or missing fetches have no entry.
pub type BodyMap = FxHashMap<RequestId, String>;

// ============================================================================
// BodySlot
// ============================================================================

/// Write half of one pending fetch. Resolving consumes it.
#[derive(Debug)]
pub struct BodySlot {
    request_id: RequestId,
    tx: oneshot::Sender<Option<String>>,
}

impl BodySlot {
    /// Returns the request this slot belongs to.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Resolves the fetch with a body, or with nothing on soft failure.
    pub fn resolve(self, body: Option<String>) {
        // The receiver is gone only if collection already gave up on it.
        let _ = self.tx.send(body);
    }
}

// ============================================================================
// PendingBodies
// ============================================================================

#[derive(Default)]
struct PendingInner {
    in_flight: Vec<(RequestId, oneshot::Receiver<Option<String>>)>,
    awaiting_load: FxHashMap<RequestId, BodySlot>,
    closed: bool,
}

/// Pending body fetches of one capture.
#[derive(Default)]
pub struct PendingBodies {
    inner: Mutex<PendingInner>,
}

impl PendingBodies {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fetch that starts right away.
    ///
    /// Returns `None` once collection has begun; the fetch must not start.
    #[must_use]
    pub fn register(&self, request_id: RequestId) -> Option<BodySlot> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }

        let (tx, rx) = oneshot::channel();
        inner.in_flight.push((request_id.clone(), rx));
        Some(BodySlot { request_id, tx })
    }

    /// Registers a fetch that waits for the request's load to finish.
    ///
    /// Returns `false` once collection has begun.
    pub fn defer(&self, request_id: RequestId) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }

        let (tx, rx) = oneshot::channel();
        inner.in_flight.push((request_id.clone(), rx));

        let slot = BodySlot {
            request_id: request_id.clone(),
            tx,
        };
        if let Some(previous) = inner.awaiting_load.insert(request_id, slot) {
            previous.resolve(None);
        }
        true
    }

    /// Releases a deferred fetch, if one is parked for `request_id`.
    #[must_use]
    pub fn release(&self, request_id: &str) -> Option<BodySlot> {
        self.inner.lock().awaiting_load.remove(request_id)
    }

    /// Returns the number of registered fetches not yet collected.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Returns `true` once collection has begun.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Returns `true` if no fetch is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of fetches parked until their load finishes.
    #[inline]
    #[must_use]
    pub fn deferred_len(&self) -> usize {
        self.inner.lock().awaiting_load.len()
    }

    /// Awaits every registered fetch and combines the results.
    ///
    /// With a `limit`, fetches still unresolved when it elapses count as
    /// missing. Parked fetches that never got released are dropped after
    /// the wait. Later results for the same request overwrite earlier ones.
    /// Registration is closed for good as soon as this is called.
    pub async fn collect(&self, limit: Option<Duration>) -> BodyMap {
        let in_flight = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            std::mem::take(&mut inner.in_flight)
        };
        let total = in_flight.len();
        let deadline = limit.map(|limit| Instant::now() + limit);

        let results = join_all(in_flight.into_iter().map(|(request_id, rx)| async move {
            let body = match deadline {
                Some(deadline) => match timeout_at(deadline, rx).await {
                    Ok(received) => received.ok().flatten(),
                    Err(_) => {
                        warn!(%request_id, "Gave up waiting for response body");
                        None
                    }
                },
                None => rx.await.ok().flatten(),
            };
            (request_id, body)
        }))
        .await;

        let abandoned = {
            let mut inner = self.inner.lock();
            let abandoned = inner.awaiting_load.len();
            inner.awaiting_load.clear();
            abandoned
        };

        let mut bodies = BodyMap::default();
        for (request_id, body) in results {
            if let Some(body) = body {
                bodies.insert(request_id, body);
            }
        }

        debug!(total, captured = bodies.len(), abandoned, "Collected response bodies");
        bodies
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    #[tokio::test]
    async fn test_collect_resolved_in_any_order() {
        let pending = PendingBodies::new();
        let first = pending.register(RequestId::from("1")).expect("open");
        let second = pending.register(RequestId::from("2")).expect("open");
        let third = pending.register(RequestId::from("3")).expect("open");
        assert_eq!(pending.len(), 3);

        third.resolve(Some("c".into()));
        first.resolve(Some("a".into()));
        second.resolve(None);

        let bodies = pending.collect(None).await;
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies.get("1").map(String::as_str), Some("a"));
        assert_eq!(bodies.get("3").map(String::as_str), Some("c"));
        assert!(!bodies.contains_key("2"));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_collect_waits_for_late_resolution() {
        let pending = Arc::new(PendingBodies::new());
        let slot = pending.register(RequestId::from("late")).expect("open");

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            slot.resolve(Some("done".into()));
        });

        let bodies = pending.collect(None).await;
        assert_eq!(bodies.get("late").map(String::as_str), Some("done"));
    }

    #[tokio::test]
    async fn test_deferred_release() {
        let pending = PendingBodies::new();
        assert!(pending.defer(RequestId::from("doc")));
        assert_eq!(pending.deferred_len(), 1);
        assert!(pending.release("other").is_none());

        let slot = pending.release("doc").expect("parked slot");
        assert_eq!(slot.request_id().as_str(), "doc");
        slot.resolve(Some("<html></html>".into()));

        let bodies = pending.collect(None).await;
        assert_eq!(bodies.get("doc").map(String::as_str), Some("<html></html>"));
    }

    #[tokio::test]
    async fn test_unreleased_fetch_times_out() {
        let pending = PendingBodies::new();
        assert!(pending.defer(RequestId::from("never")));
        let ready = pending.register(RequestId::from("ready")).expect("open");
        ready.resolve(Some("ok".into()));

        let bodies = pending.collect(Some(Duration::from_millis(30))).await;
        assert_eq!(bodies.len(), 1);
        assert!(bodies.contains_key("ready"));
        assert_eq!(pending.deferred_len(), 0);
    }

    #[tokio::test]
    async fn test_dropped_slot_counts_as_missing() {
        let pending = PendingBodies::new();
        drop(pending.register(RequestId::from("dropped")));

        let bodies = pending.collect(None).await;
        assert!(bodies.is_empty());
    }

    #[tokio::test]
    async fn test_redeferring_resolves_previous() {
        let pending = PendingBodies::new();
        assert!(pending.defer(RequestId::from("dup")));
        assert!(pending.defer(RequestId::from("dup")));

        pending
            .release("dup")
            .expect("latest slot")
            .resolve(Some("second".into()));

        let bodies = pending.collect(Some(Duration::from_millis(50))).await;
        assert_eq!(bodies.get("dup").map(String::as_str), Some("second"));
    }

    #[tokio::test]
    async fn test_registration_closed_once_collecting() {
        let pending = Arc::new(PendingBodies::new());
        assert!(pending.defer(RequestId::from("doc")));

        let collecting = {
            let pending = Arc::clone(&pending);
            tokio::spawn(async move { pending.collect(None).await })
        };
        tokio::task::yield_now().await;
        assert!(pending.is_closed());

        assert!(pending.register(RequestId::from("late")).is_none());
        assert!(!pending.defer(RequestId::from("late-doc")));
        assert_eq!(pending.deferred_len(), 1);

        // Parked fetches registered before collection still resolve.
        pending
            .release("doc")
            .expect("parked slot")
            .resolve(Some("<html></html>".into()));

        let bodies = collecting.await.expect("collect task");
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies.get("doc").map(String::as_str), Some("<html></html>"));
        assert!(pending.is_empty());
    }
}
