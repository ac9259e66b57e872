//! DevTools protocol message types.
//!
//! This module defines the message format spoken over a page's DevTools
//! WebSocket.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Command` | Local → Browser | Command request, carries numeric `id` |
//! | `Response` | Browser → Local | Command result or error, same `id` |
//! | `Event` | Browser → Local | Notification, `method` + `params` only |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command and Response types, well-known methods |
//! | `event` | Event type, observed event names, typed params |

// ============================================================================
// Submodules
// ============================================================================

/// Command and Response message types.
pub mod command;

/// Event message types.
pub mod event;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    Command, GET_RESPONSE_BODY, NETWORK_DOMAIN, PAGE_DOMAIN, Response, ResponseError,
};
pub use event::{
    Event, LoadingSignal, NETWORK_EVENTS, PAGE_EVENTS, ResponseBody, ResponseInfo,
    ResponseReceived,
};
