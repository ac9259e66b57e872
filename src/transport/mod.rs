//! WebSocket transport layer.
//!
//! This module handles communication with a page's DevTools endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  CdpSession     │         WebSocket            │  Browser        │
//! │  (Rust)         │◄────────────────────────────►│  DevTools       │
//! │  → Connection   │   ws://host/devtools/page/X  │  page target    │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::connect` - WebSocket handshake with the page endpoint
//! 2. `Connection::set_event_handler` - route events to session listeners
//! 3. `Connection::send` - commands, correlated by numeric id
//! 4. `Connection::shutdown` - close the socket, fail pending commands

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, EventHandler};
