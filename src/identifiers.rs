//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time:
//!
//! | Type | Identifies |
//! |------|------------|
//! | [`CommandId`] | A DevTools command, for response correlation |
//! | [`SubscriptionId`] | One listener registered on a session |
//! | [`RequestId`] | A network request as reported by the browser |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// Counters
// ============================================================================

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// CommandId
// ============================================================================

/// Identifier of a command sent over a DevTools connection.
///
/// Serialized as the bare integer the protocol expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Creates a command ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Generates the next process-unique command ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Identifier of a single event listener.
///
/// Returned by `Session::on` and required by `Session::off`, so removing a
/// listener never touches listeners registered by anyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generates the next process-unique subscription ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// RequestId
// ============================================================================

/// Network request identifier assigned by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates a request ID.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RequestId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashMap;

    #[test]
    fn test_command_ids_are_unique() {
        let a = CommandId::generate();
        let b = CommandId::generate();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_command_id_serializes_as_number() {
        let json = serde_json::to_string(&CommandId::new(42)).expect("serialize");
        assert_eq!(json, "42");
    }

    #[test]
    fn test_subscription_ids_are_unique() {
        assert_ne!(SubscriptionId::generate(), SubscriptionId::generate());
    }

    #[test]
    fn test_request_id_lookup_by_str() {
        let mut map = FxHashMap::default();
        map.insert(RequestId::from("1000.1"), 1);
        assert_eq!(map.get("1000.1"), Some(&1));
        assert_eq!(RequestId::new("1000.1").to_string(), "1000.1");
    }
}
