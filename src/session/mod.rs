//! Protocol sessions and page handles.
//!
//! A [`Session`] is the connection to one page's protocol stream: it can
//! subscribe callbacks to named events, remove exactly those subscriptions
//! again, issue commands and finally be detached. A [`Page`] is anything
//! that can open such a session.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `cdp` | [`CdpSession`] over a DevTools WebSocket, [`PageTarget`] |
//! | `listeners` | [`ListenerRegistry`] shared by session implementations |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::Result;
use crate::identifiers::SubscriptionId;

// ============================================================================
// Submodules
// ============================================================================

/// DevTools WebSocket session.
pub mod cdp;

/// Per-event listener bookkeeping.
pub mod listeners;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use cdp::{CdpSession, PageTarget};
pub use listeners::ListenerRegistry;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with the params of every matching event.
///
/// Runs on the task that delivers events, so it must not block.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

// ============================================================================
// Session
// ============================================================================

/// Connection to a single page's protocol stream.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Enables a protocol domain (`Page`, `Network`, ...).
    ///
    /// # Errors
    ///
    /// Returns the command error if the browser rejects the call.
    async fn enable_domain(&self, domain: &str) -> Result<()> {
        self.send_command(&format!("{domain}.enable"), json!({}))
            .await
            .map(|_| ())
    }

    /// Registers `callback` for `event`.
    fn on(&self, event: &str, callback: EventCallback) -> SubscriptionId;

    /// Removes the listener registered under `subscription`.
    ///
    /// Returns `false` if it was not registered for `event`.
    fn off(&self, event: &str, subscription: SubscriptionId) -> bool;

    /// Sends a command and returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cdp`](crate::Error::Cdp) for browser-side failures
    /// and transport errors otherwise.
    async fn send_command(&self, method: &str, params: Value) -> Result<Value>;

    /// Releases the session. No events are delivered afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionDetached`](crate::Error::SessionDetached) on a
    /// second call, or the transport error if closing fails.
    async fn detach(&self) -> Result<()>;
}

// ============================================================================
// Page
// ============================================================================

/// Handle to a page that protocol sessions can be opened against.
#[async_trait]
pub trait Page: Send + Sync {
    /// Session type produced by this page.
    type Session: Session;

    /// Opens a new session bound to the page.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the page cannot be reached.
    async fn create_session(&self) -> Result<Self::Session>;
}
