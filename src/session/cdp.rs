//! DevTools WebSocket session.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::Command;
use crate::transport::Connection;

use super::{EventCallback, ListenerRegistry, Page, Session};

// ============================================================================
// CdpSession
// ============================================================================

/// [`Session`] over a page's DevTools WebSocket.
///
/// Owns the connection: [`Session::detach`] closes it.
pub struct CdpSession {
    connection: Connection,
    listeners: Arc<ListenerRegistry>,
    detached: AtomicBool,
}

impl fmt::Debug for CdpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdpSession")
            .field("pending", &self.connection.pending_count())
            .field("detached", &self.is_detached())
            .finish_non_exhaustive()
    }
}

impl CdpSession {
    /// Connects to a DevTools page endpoint.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the handshake fails.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let connection = Connection::connect(ws_url).await?;
        Ok(Self::from_connection(connection))
    }

    /// Wraps an established connection and routes its events to listeners.
    #[must_use]
    pub fn from_connection(connection: Connection) -> Self {
        let listeners = Arc::new(ListenerRegistry::new());

        let routed = Arc::clone(&listeners);
        connection.set_event_handler(Box::new(move |event| {
            routed.dispatch(&event.method, &event.params);
        }));

        Self {
            connection,
            listeners,
            detached: AtomicBool::new(false),
        }
    }

    /// Returns `true` once [`Session::detach`] has been called.
    #[inline]
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Returns the listener registry.
    #[inline]
    #[must_use]
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}

#[async_trait]
impl Session for CdpSession {
    fn on(&self, event: &str, callback: EventCallback) -> SubscriptionId {
        if self.is_detached() {
            warn!(event, "Listener added to detached session");
        }
        self.listeners.add(event, callback)
    }

    fn off(&self, event: &str, subscription: SubscriptionId) -> bool {
        self.listeners.remove(event, subscription)
    }

    async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_detached() {
            return Err(Error::SessionDetached);
        }

        let response = self.connection.send(Command::new(method, params)).await?;
        response.into_result(method)
    }

    async fn detach(&self) -> Result<()> {
        if self.detached.swap(true, Ordering::AcqRel) {
            return Err(Error::SessionDetached);
        }

        self.connection.clear_event_handler();
        self.listeners.clear();
        self.connection.shutdown()?;

        debug!("Session detached");
        Ok(())
    }
}

// ============================================================================
// PageTarget
// ============================================================================

/// A page reachable through its DevTools WebSocket URL.
///
/// The URL is the `webSocketDebuggerUrl` the browser lists for the page,
/// e.g. `ws://127.0.0.1:9222/devtools/page/<target-id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTarget {
    ws_url: Url,
}

impl PageTarget {
    /// Creates a page handle from its DevTools WebSocket URL.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the URL does not parse
    /// - [`Error::InvalidArgument`] if the scheme is not `ws` or `wss`
    pub fn new(ws_url: &str) -> Result<Self> {
        let ws_url = Url::parse(ws_url)?;

        if !matches!(ws_url.scheme(), "ws" | "wss") {
            return Err(Error::invalid_argument(format!(
                "DevTools URL must use ws:// or wss://, got {}://",
                ws_url.scheme()
            )));
        }

        Ok(Self { ws_url })
    }

    /// Returns the DevTools WebSocket URL.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> &str {
        self.ws_url.as_str()
    }
}

#[async_trait]
impl Page for PageTarget {
    type Session = CdpSession;

    async fn create_session(&self) -> Result<CdpSession> {
        CdpSession::connect(self.ws_url.as_str()).await
    }
}

// ============================================================================
// Tests
// ============================================================================
