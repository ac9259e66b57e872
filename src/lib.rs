//! HAR Capture - record a browser page's network activity as a HAR archive.
//!
//! This library attaches to a page over the DevTools protocol, records page
//! lifecycle and network events while the page is driven, optionally fetches
//! response bodies, and turns the recording into a HAR 1.2 document.
//!
//! # Architecture
//!
//! A capture is made of three cooperating parts on one session:
//!
//! - **Event observers**: one for page events, one for network events, each
//!   buffering raw `{method, params}` records in arrival order
//! - **Response capturer**: fetches bodies of eligible responses in the
//!   background and merges them into the recorded `responseReceived` events
//! - **Controller**: enables the domains, stops everything in order and hands
//!   the records to an [`ArchiveSerializer`]
//!
//! Key design principles:
//!
//! - Stopping consumes the capture handle, so it happens exactly once
//! - Body fetch failures are soft and never abort a capture
//! - Event-driven throughout (no polling)
//!
//! # Quick Start
//!
//! ```no_run
//! use har_capture::{CaptureOptions, PageTarget, Result, capture_network};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let page = PageTarget::new("ws://127.0.0.1:9222/devtools/page/ABC")?;
//!     let options = CaptureOptions::new().with_save_responses(true);
//!
//!     let capture = capture_network(&page, options).await?;
//!     // ... navigate and interact through capture.session() ...
//!     let har = capture.stop().await?;
//!
//!     println!("{}", har.to_json_pretty()?);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`capture`] | Capture controller, observers, body capture |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`har`] | HAR types and serializers |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | DevTools message types (internal) |
//! | [`session`] | [`Session`] and [`Page`] abstractions, DevTools session |
//! | [`transport`] | WebSocket transport layer (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Network capture: controller, event observers, response bodies.
///
/// Use [`capture_network`] to start a capture.
pub mod capture;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// HAR document types and archive serializers.
pub mod har;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// DevTools protocol message types.
///
/// Internal module defining command/response/event structures.
pub mod protocol;

/// Protocol sessions and pages.
pub mod session;

/// WebSocket transport layer.
///
/// Internal module handling the DevTools WebSocket connection.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Capture types
pub use capture::{
    CaptureOptions, EventObserver, NetworkCapture, ObservedEvent, ResponseCapturer,
    capture_network,
};

// Error types
pub use error::{Error, Result};

// Archive types
pub use har::{ArchiveSerializer, Har, HarSerializer};

// Identifier types
pub use identifiers::{CommandId, RequestId, SubscriptionId};

// Session types
pub use session::{CdpSession, EventCallback, Page, PageTarget, Session};
