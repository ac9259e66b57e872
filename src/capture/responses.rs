//! Response body capture.
//!
//! While attached, every qualifying `Network.responseReceived` starts a
//! `Network.getResponseBody` fetch in the background. HTML documents are
//! only fetched once their `Network.loadingFinished` arrives, because the
//! browser does not hold the full body before that.
//!
//! Fetch failures are soft: the resource is commonly flushed once the page
//! navigates away, and a missing body must never abort the capture.
//!
//! # Lifecycle
//!
//! ```text
//! attach ──► responseReceived ──► register / defer ──► fetch task ──► slot
//!                                        ▲
//!                  loadingFinished ──────┘ (HTML only)
//!
//! merge  ──► stop new fetches ──► await all slots ──► enrich events
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::identifiers::{RequestId, SubscriptionId};
use crate::protocol::event::{
    NETWORK_LOADING_FAILED, NETWORK_LOADING_FINISHED, NETWORK_RESPONSE_RECEIVED,
};
use crate::protocol::{
    GET_RESPONSE_BODY, LoadingSignal, ResponseBody, ResponseInfo, ResponseReceived,
};
use crate::session::{EventCallback, Session};

use super::observer::ObservedEvent;
use super::options::CaptureOptions;
use super::pending::{BodyMap, BodySlot, PendingBodies};

// ============================================================================
// Constants
// ============================================================================

/// MIME type whose body only becomes available after `loadingFinished`.
const DEFERRED_MIME_TYPE: &str = "text/html";

/// HTTP 204 No Content.
const STATUS_NO_CONTENT: u16 = 204;

// ============================================================================
// ResponseCapturer
// ============================================================================

/// Fetches response bodies and merges them into recorded network events.
pub struct ResponseCapturer<S: Session> {
    session: Arc<S>,
    pending: Arc<PendingBodies>,
    subscriptions: Vec<(&'static str, SubscriptionId)>,
    body_timeout: Option<Duration>,
}

impl<S: Session> fmt::Debug for ResponseCapturer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCapturer")
            .field("active", &self.is_active())
            .field("pending", &self.pending.len())
            .field("body_timeout", &self.body_timeout)
            .finish_non_exhaustive()
    }
}

impl<S: Session> ResponseCapturer<S> {
    /// Attaches to `session`.
    ///
    /// With `save_responses` disabled nothing is subscribed and
    /// [`merge`](Self::merge) returns its input untouched.
    pub fn attach(session: &Arc<S>, options: &CaptureOptions) -> Self {
        let pending = Arc::new(PendingBodies::new());
        let mut capturer = Self {
            session: Arc::clone(session),
            pending: Arc::clone(&pending),
            subscriptions: Vec::new(),
            body_timeout: options.body_timeout,
        };

        if !options.save_responses {
            return capturer;
        }

        let weak = Arc::downgrade(session);
        let mime_types = Arc::new(options.capture_mime_types.clone());

        let on_response: EventCallback = {
            let weak = Weak::clone(&weak);
            let pending = Arc::clone(&pending);
            Arc::new(move |params: &Value| {
                on_response_received(&weak, &pending, &mime_types, params);
            })
        };
        let on_finished: EventCallback = {
            let pending = Arc::clone(&pending);
            Arc::new(move |params: &Value| {
                if let Some(slot) = released(&pending, params) {
                    spawn_fetch(Weak::clone(&weak), slot);
                }
            })
        };
        let on_failed: EventCallback = Arc::new(move |params: &Value| {
            if let Some(slot) = released(&pending, params) {
                debug!(request_id = %slot.request_id(), "Load failed before body was available");
                slot.resolve(None);
            }
        });

        capturer.subscriptions = vec![
            (NETWORK_RESPONSE_RECEIVED, session.on(NETWORK_RESPONSE_RECEIVED, on_response)),
            (NETWORK_LOADING_FINISHED, session.on(NETWORK_LOADING_FINISHED, on_finished)),
            (NETWORK_LOADING_FAILED, session.on(NETWORK_LOADING_FAILED, on_failed)),
        ];

        debug!(mime_types = options.capture_mime_types.len(), "Response capturer attached");
        capturer
    }

    /// Returns `true` if bodies are being captured.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Stops capturing, awaits outstanding fetches and adds each fetched
    /// body to the `response` of the matching events.
    ///
    /// Order is preserved and events without a matching body pass through
    /// unchanged.
    pub async fn merge(mut self, network_events: Vec<ObservedEvent>) -> Vec<ObservedEvent> {
        if !self.is_active() {
            return network_events;
        }

        // No new fetches from here on; parked HTML fetches may still be released.
        self.unsubscribe(NETWORK_RESPONSE_RECEIVED);

        let bodies = self.pending.collect(self.body_timeout).await;
        self.unsubscribe_all();

        merge_bodies(network_events, &bodies)
    }

    fn unsubscribe(&mut self, event: &str) {
        self.subscriptions.retain(|(name, id)| {
            if *name == event {
                self.session.off(name, *id);
                false
            } else {
                true
            }
        });
    }

    fn unsubscribe_all(&mut self) {
        for (name, id) in self.subscriptions.drain(..) {
            self.session.off(name, id);
        }
    }
}

impl<S: Session> Drop for ResponseCapturer<S> {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

// ============================================================================
// Enrichment
// ============================================================================

/// Sets `params.response.body` on every event whose request has a body.
///
/// Events lacking a request ID or a response object are returned as is.
#[must_use]
pub fn merge_bodies(network_events: Vec<ObservedEvent>, bodies: &BodyMap) -> Vec<ObservedEvent> {
    if bodies.is_empty() {
        return network_events;
    }

    network_events
        .into_iter()
        .map(|mut event| {
            let body = event
                .response()
                .and(event.request_id())
                .and_then(|request_id| bodies.get(request_id))
                .cloned();

            if let Some(body) = body
                && let Some(response) = event
                    .params
                    .get_mut("response")
                    .and_then(Value::as_object_mut)
            {
                response.insert("body".to_string(), Value::String(body));
            }

            event
        })
        .collect()
}

// ============================================================================
// Event Handling
// ============================================================================

fn on_response_received<S: Session>(
    session: &Weak<S>,
    pending: &PendingBodies,
    mime_types: &FxHashSet<String>,
    params: &Value,
) {
    let received = match ResponseReceived::deserialize(params) {
        Ok(received) => received,
        Err(e) => {
            trace!(error = %e, "Ignoring malformed responseReceived");
            return;
        }
    };

    if !wants_body(&received.response, mime_types) {
        return;
    }

    let request_id = received.request_id;
    if received.response.mime_type == DEFERRED_MIME_TYPE {
        if pending.defer(request_id.clone()) {
            trace!(%request_id, "Body fetch deferred until load finishes");
        } else {
            debug!(%request_id, "Response arrived after merge began, body skipped");
        }
    } else {
        match pending.register(request_id.clone()) {
            Some(slot) => spawn_fetch(Weak::clone(session), slot),
            None => debug!(%request_id, "Response arrived after merge began, body skipped"),
        }
    }
}

/// Returns `true` if the body can be retrieved and is wanted.
fn wants_body(response: &ResponseInfo, mime_types: &FxHashSet<String>) -> bool {
    response.status != STATUS_NO_CONTENT
        && !response.is_redirect()
        && mime_types.contains(&response.mime_type)
}

/// Takes the parked fetch of the request a loading signal refers to.
fn released(pending: &PendingBodies, params: &Value) -> Option<BodySlot> {
    let signal = LoadingSignal::deserialize(params).ok()?;
    pending.release(signal.request_id.as_str())
}

// ============================================================================
// Body Fetching
// ============================================================================

fn spawn_fetch<S: Session>(session: Weak<S>, slot: BodySlot) {
    tokio::spawn(async move {
        let body = match session.upgrade() {
            Some(session) => fetch_body(session.as_ref(), slot.request_id()).await,
            None => None,
        };
        slot.resolve(body);
    });
}

/// Retrieves and decodes one body. Failures are logged, never returned.
async fn fetch_body<S: Session>(session: &S, request_id: &RequestId) -> Option<String> {
    let result = session
        .send_command(GET_RESPONSE_BODY, json!({ "requestId": request_id }))
        .await
        .and_then(|value| serde_json::from_value::<ResponseBody>(value).map_err(Error::from))
        .and_then(ResponseBody::into_text);

    match result {
        Ok(text) => {
            trace!(%request_id, len = text.len(), "Response body fetched");
            Some(text)
        }
        Err(e) => {
            warn!(%request_id, error = %e, "Failed to fetch response body");
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
