//! Test doubles for sessions and the DevTools endpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::GET_RESPONSE_BODY;

use super::{EventCallback, ListenerRegistry, Page, Session};

// ============================================================================
// Logging
// ============================================================================

/// Routes crate logs to the test output. `RUST_LOG` overrides the filter.
pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("har_capture=debug"));

    // Another test may have installed it already.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MockSession
// ============================================================================

#[derive(Default)]
struct MockInner {
    listeners: ListenerRegistry,
    bodies: Mutex<FxHashMap<String, Value>>,
    failing_domains: Mutex<FxHashSet<String>>,
    commands: Mutex<Vec<String>>,
    detach_count: AtomicUsize,
    fail_detach: AtomicBool,
}

/// In-memory session driven by the test through [`MockSession::emit`].
#[derive(Clone, Default)]
pub(crate) struct MockSession {
    inner: Arc<MockInner>,
}

impl MockSession {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serves `text` as a plain body for `request_id`.
    pub(crate) fn with_body(self, request_id: &str, text: &str) -> Self {
        self.inner.bodies.lock().insert(
            request_id.to_string(),
            json!({ "body": text, "base64Encoded": false }),
        );
        self
    }

    /// Serves `text` base64 encoded for `request_id`.
    pub(crate) fn with_base64_body(self, request_id: &str, text: &str) -> Self {
        self.inner.bodies.lock().insert(
            request_id.to_string(),
            json!({ "body": Base64Standard.encode(text), "base64Encoded": true }),
        );
        self
    }

    /// Makes `<domain>.enable` fail.
    pub(crate) fn failing_domain(self, domain: &str) -> Self {
        self.inner.failing_domains.lock().insert(domain.to_string());
        self
    }

    /// Makes `detach` fail.
    pub(crate) fn failing_detach(self) -> Self {
        self.inner.fail_detach.store(true, Ordering::Release);
        self
    }

    /// Delivers an event to the current listeners.
    pub(crate) fn emit(&self, event: &str, params: Value) -> usize {
        self.inner.listeners.dispatch(event, &params)
    }

    /// Copies the current listeners of `event` the way dispatch does.
    pub(crate) fn callbacks(&self, event: &str) -> Vec<EventCallback> {
        self.inner.listeners.callbacks(event)
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.inner.commands.lock().clone()
    }

    pub(crate) fn body_requests(&self) -> usize {
        self.commands()
            .iter()
            .filter(|method| method.as_str() == GET_RESPONSE_BODY)
            .count()
    }

    pub(crate) fn detach_count(&self) -> usize {
        self.inner.detach_count.load(Ordering::Acquire)
    }

    pub(crate) fn listener_count(&self, event: &str) -> usize {
        self.inner.listeners.listener_count(event)
    }

    pub(crate) fn has_listeners(&self) -> bool {
        !self.inner.listeners.is_empty()
    }
}

#[async_trait]
impl Session for MockSession {
    fn on(&self, event: &str, callback: EventCallback) -> SubscriptionId {
        self.inner.listeners.add(event, callback)
    }

    fn off(&self, event: &str, subscription: SubscriptionId) -> bool {
        self.inner.listeners.remove(event, subscription)
    }

    async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        self.inner.commands.lock().push(method.to_string());

        if let Some(domain) = method.strip_suffix(".enable")
            && self.inner.failing_domains.lock().contains(domain)
        {
            return Err(Error::cdp(method, -32601, format!("'{method}' wasn't found")));
        }

        if method == GET_RESPONSE_BODY {
            let request_id = params["requestId"].as_str().unwrap_or_default();
            return self.inner.bodies.lock().get(request_id).cloned().ok_or_else(|| {
                Error::cdp(method, -32000, "No resource with given identifier found")
            });
        }

        Ok(json!({}))
    }

    async fn detach(&self) -> Result<()> {
        self.inner.detach_count.fetch_add(1, Ordering::AcqRel);
        if self.inner.fail_detach.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }
}

/// Page whose sessions are clones of one [`MockSession`].
pub(crate) struct MockPage {
    pub(crate) session: MockSession,
}

#[async_trait]
impl Page for MockPage {
    type Session = MockSession;

    async fn create_session(&self) -> Result<MockSession> {
        Ok(self.session.clone())
    }
}

// ============================================================================
// FakeDevTools
// ============================================================================

/// Single-client DevTools endpoint on localhost.
///
/// - `Page.navigate` replies, then pushes the scripted events in order
/// - `Network.getResponseBody` serves scripted bodies, `-32000` otherwise
/// - every other command succeeds with `{}`
pub(crate) struct FakeDevTools {
    pub(crate) url: String,
}

#[derive(Default)]
pub(crate) struct FakeDevToolsBuilder {
    navigate_events: Vec<Value>,
    bodies: FxHashMap<String, Value>,
}

impl FakeDevTools {
    pub(crate) fn builder() -> FakeDevToolsBuilder {
        FakeDevToolsBuilder::default()
    }
}

impl FakeDevToolsBuilder {
    pub(crate) fn on_navigate(mut self, event: Value) -> Self {
        self.navigate_events.push(event);
        self
    }

    pub(crate) fn body(mut self, request_id: &str, body: Value) -> Self {
        self.bodies.insert(request_id.to_string(), body);
        self
    }

    pub(crate) async fn start(self) -> FakeDevTools {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");

            while let Some(Ok(message)) = ws.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let command: Value = serde_json::from_str(&text).expect("command json");
                let method = command["method"].as_str().unwrap_or_default();

                let reply = match method {
                    "Network.getResponseBody" => {
                        let request_id = command["params"]["requestId"].as_str().unwrap_or_default();
                        match self.bodies.get(request_id) {
                            Some(body) => json!({ "id": command["id"], "result": body }),
                            None => json!({
                                "id": command["id"],
                                "error": { "code": -32000, "message": "No resource with given identifier found" }
                            }),
                        }
                    }
                    "Page.navigate" => json!({ "id": command["id"], "result": { "frameId": "F1" } }),
                    _ => json!({ "id": command["id"], "result": {} }),
                };

                if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                    break;
                }

                if method == "Page.navigate" {
                    for event in &self.navigate_events {
                        if ws.send(Message::Text(event.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        FakeDevTools {
            url: format!("ws://127.0.0.1:{port}/devtools/page/FAKE"),
        }
    }
}
