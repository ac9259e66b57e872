//! Error types for HAR capture.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use har_capture::{Result, CaptureOptions, capture_network};
//!
//! async fn example(page: &PageTarget) -> Result<()> {
//!     let capture = capture_network(page, CaptureOptions::default()).await?;
//!     let har = capture.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::Cdp`], [`Error::CommandTimeout`] |
//! | Session | [`Error::DomainEnable`], [`Error::SessionDetached`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;
use url::ParseError as UrlParseError;

use crate::identifiers::CommandId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when capture options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to an API.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timed out while opening the connection.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The browser answered a command with an error object.
    ///
    /// Most commonly seen for `Network.getResponseBody` once the page
    /// navigated and the resource was flushed.
    #[error("{method} failed ({code}): {message}")]
    Cdp {
        /// Command method that failed.
        method: String,
        /// DevTools error code.
        code: i64,
        /// DevTools error message.
        message: String,
    },

    /// Command response did not arrive in time.
    #[error("Command {command_id} ({method}) timed out after {timeout_ms}ms")]
    CommandTimeout {
        /// The command ID that timed out.
        command_id: CommandId,
        /// Command method.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Enabling a protocol domain failed during capture setup.
    #[error("Failed to enable {domain} domain: {source}")]
    DomainEnable {
        /// Domain name (`Page`, `Network`).
        domain: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The session has already been detached.
    #[error("Session detached")]
    SessionDetached,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] UrlParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a DevTools command error.
    #[inline]
    pub fn cdp(method: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Cdp {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// Creates a command timeout error.
    #[inline]
    pub fn command_timeout(
        command_id: CommandId,
        method: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self::CommandTimeout {
            command_id,
            method: method.into(),
            timeout_ms,
        }
    }

    /// Wraps a failure to enable a protocol domain.
    #[inline]
    pub fn domain_enable(domain: impl Into<String>, source: Error) -> Self {
        Self::DomainEnable {
            domain: domain.into(),
            source: Box::new(source),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::CommandTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error aborted capture setup.
    #[inline]
    #[must_use]
    pub fn is_setup_error(&self) -> bool {
        matches!(self, Self::DomainEnable { .. } | Self::Config { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_cdp_error_display() {
        let err = Error::cdp(
            "Network.getResponseBody",
            -32000,
            "No resource with given identifier found",
        );
        assert_eq!(
            err.to_string(),
            "Network.getResponseBody failed (-32000): No resource with given identifier found"
        );
    }

    #[test]
    fn test_domain_enable_wraps_source() {
        let err = Error::domain_enable("Network", Error::ConnectionClosed);
        assert_eq!(
            err.to_string(),
            "Failed to enable Network domain: Connection closed"
        );
        assert!(err.is_setup_error());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::command_timeout(CommandId::new(7), "Page.enable", 5000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::connection_timeout(1000).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
