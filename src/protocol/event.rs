//! Event message types.
//!
//! Events are notifications pushed by the browser when page or network
//! state changes. They carry no `id`, only a method and its params.
//!
//! # Observed Events
//!
//! | Domain | Events |
//! |--------|--------|
//! | `Page` | `loadEventFired`, `domContentEventFired`, `frameStartedLoading`, `frameAttached`, `frameScheduledNavigation` |
//! | `Network` | `requestWillBeSent`, `requestServedFromCache`, `dataReceived`, `responseReceived`, `resourceChangedPriority`, `loadingFinished`, `loadingFailed` |

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Event Names
// ============================================================================

pub const PAGE_LOAD_EVENT_FIRED: &str = "Page.loadEventFired";
pub const PAGE_DOM_CONTENT_EVENT_FIRED: &str = "Page.domContentEventFired";
pub const PAGE_FRAME_STARTED_LOADING: &str = "Page.frameStartedLoading";
pub const PAGE_FRAME_ATTACHED: &str = "Page.frameAttached";
pub const PAGE_FRAME_SCHEDULED_NAVIGATION: &str = "Page.frameScheduledNavigation";

pub const NETWORK_REQUEST_WILL_BE_SENT: &str = "Network.requestWillBeSent";
pub const NETWORK_REQUEST_SERVED_FROM_CACHE: &str = "Network.requestServedFromCache";
pub const NETWORK_DATA_RECEIVED: &str = "Network.dataReceived";
pub const NETWORK_RESPONSE_RECEIVED: &str = "Network.responseReceived";
pub const NETWORK_RESOURCE_CHANGED_PRIORITY: &str = "Network.resourceChangedPriority";
pub const NETWORK_LOADING_FINISHED: &str = "Network.loadingFinished";
pub const NETWORK_LOADING_FAILED: &str = "Network.loadingFailed";

/// Page lifecycle events recorded by a capture.
pub const PAGE_EVENTS: &[&str] = &[
    PAGE_LOAD_EVENT_FIRED,
    PAGE_DOM_CONTENT_EVENT_FIRED,
    PAGE_FRAME_STARTED_LOADING,
    PAGE_FRAME_ATTACHED,
    PAGE_FRAME_SCHEDULED_NAVIGATION,
];

/// Network lifecycle events recorded by a capture.
pub const NETWORK_EVENTS: &[&str] = &[
    NETWORK_REQUEST_WILL_BE_SENT,
    NETWORK_REQUEST_SERVED_FROM_CACHE,
    NETWORK_DATA_RECEIVED,
    NETWORK_RESPONSE_RECEIVED,
    NETWORK_RESOURCE_CHANGED_PRIORITY,
    NETWORK_LOADING_FINISHED,
    NETWORK_LOADING_FAILED,
];

// ============================================================================
// Event
// ============================================================================

/// An event notification from the browser.
///
/// # Format
///
/// ```json
/// { "method": "Network.loadingFinished", "params": { "requestId": "1000.1", ... } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl Event {
    /// Returns the domain name from the method.
    ///
    /// ```ignore
    /// let event = Event { method: "Network.dataReceived".into(), .. };
    /// assert_eq!(event.domain(), "Network");
    /// ```
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Returns the event name from the method.
    #[inline]
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.method.split('.').nth(1).unwrap_or_default()
    }
}

// ============================================================================
// Typed Params
// ============================================================================

/// Params of `Network.responseReceived`, reduced to what body capture needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceived {
    /// Request the response belongs to.
    pub request_id: RequestId,

    /// Response metadata.
    pub response: ResponseInfo,
}

/// The `response` object of `Network.responseReceived`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    /// HTTP status code.
    #[serde(default)]
    pub status: u16,

    /// Response headers.
    #[serde(default)]
    pub headers: Map<String, Value>,

    /// MIME type as determined by the browser.
    #[serde(default)]
    pub mime_type: String,
}

impl ResponseInfo {
    /// Looks up a header, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Returns `true` if the response redirects elsewhere.
    #[inline]
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        self.header("location").is_some_and(|value| !value.is_null())
    }
}

/// Params of `Network.loadingFinished` / `Network.loadingFailed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingSignal {
    /// Request whose load ended.
    pub request_id: RequestId,
}

/// Result of `Network.getResponseBody`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    /// Body, possibly base64.
    pub body: String,

    /// Whether `body` is base64 encoded.
    #[serde(default)]
    pub base64_encoded: bool,
}

impl ResponseBody {
    /// Decodes the body into text.
    ///
    /// Invalid UTF-8 sequences are replaced, never rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the body is flagged base64 but is not.
    pub fn into_text(self) -> Result<String> {
        if !self.base64_encoded {
            return Ok(self.body);
        }

        let bytes = Base64Standard
            .decode(self.body.as_bytes())
            .map_err(|e| Error::protocol(format!("invalid base64 response body: {e}")))?;

        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
