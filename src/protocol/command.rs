//! Command and response message types.
//!
//! # Format
//!
//! Command (local → browser):
//!
//! ```json
//! { "id": 7, "method": "Network.getResponseBody", "params": { "requestId": "1000.1" } }
//! ```
//!
//! Response (browser → local), success or error:
//!
//! ```json
//! { "id": 7, "result": { "body": "...", "base64Encoded": false } }
//! { "id": 7, "error": { "code": -32000, "message": "No resource with given identifier found" } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

// ============================================================================
// Well-known methods
// ============================================================================

/// Fetches the body of a received response.
pub const GET_RESPONSE_BODY: &str = "Network.getResponseBody";

/// Page domain name.
pub const PAGE_DOMAIN: &str = "Page";

/// Network domain name.
pub const NETWORK_DOMAIN: &str = "Network";

// ============================================================================
// Command
// ============================================================================

/// A command request from local end to the browser.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    /// Unique identifier for request/response correlation.
    pub id: CommandId,

    /// Method in `Domain.method` format.
    pub method: String,

    /// Command parameters (always an object on the wire).
    pub params: Value,
}

impl Command {
    /// Creates a new command with auto-generated ID.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            id: CommandId::generate(),
            method: method.into(),
            params: if params.is_null() { json!({}) } else { params },
        }
    }

    /// Creates the `<domain>.enable` command.
    #[inline]
    #[must_use]
    pub fn enable(domain: &str) -> Self {
        Self::new(format!("{domain}.enable"), json!({}))
    }

    /// Creates a `Network.getResponseBody` command.
    #[inline]
    #[must_use]
    pub fn get_response_body(request_id: &str) -> Self {
        Self::new(GET_RESPONSE_BODY, json!({ "requestId": request_id }))
    }
}

// ============================================================================
// Response
// ============================================================================

/// A response from the browser to a command.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    /// Matches the command `id`.
    pub id: CommandId,

    /// Result data (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error object (if error).
    #[serde(default)]
    pub error: Option<ResponseError>,
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    /// DevTools error code.
    pub code: i64,

    /// Human readable message.
    pub message: String,
}

impl Response {
    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cdp`] tagged with `method` if the browser reported an error.
    pub fn into_result(self, method: &str) -> Result<Value> {
        match self.error {
            None => Ok(self.result.unwrap_or(Value::Null)),
            Some(error) => Err(Error::cdp(method, error.code, error.message)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
