//! Network capture.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `controller` | [`capture_network`] and the running [`NetworkCapture`] |
//! | `observer` | [`EventObserver`] recording raw events |
//! | `options` | [`CaptureOptions`] |
//! | `pending` | Registry of in-flight body fetches |
//! | `responses` | [`ResponseCapturer`] fetching and merging bodies |

// ============================================================================
// Submodules
// ============================================================================

pub mod controller;
pub mod observer;
pub mod options;
pub mod pending;
pub mod responses;

// ============================================================================
// Re-exports
// ============================================================================

pub use controller::{NetworkCapture, capture_network};
pub use observer::{EventObserver, ObservedEvent};
pub use options::{CaptureOptions, DEFAULT_BODY_TIMEOUT, DEFAULT_CAPTURE_MIME_TYPES};
pub use pending::{BodyMap, BodySlot, PendingBodies};
pub use responses::{ResponseCapturer, merge_bodies};
