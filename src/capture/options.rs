//! Capture configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use har_capture::CaptureOptions;
//!
//! let options = CaptureOptions::new()
//!     .with_save_responses(true)
//!     .with_mime_type("text/css")
//!     .with_body_timeout(Duration::from_secs(5));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rustc_hash::FxHashSet;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// MIME types whose bodies are captured unless configured otherwise.
pub const DEFAULT_CAPTURE_MIME_TYPES: &[&str] = &["text/html", "application/json"];

/// Default bound on waiting for outstanding body fetches at stop time.
pub const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// CaptureOptions
// ============================================================================

/// Options for a network capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Fetch response bodies and inline them into the archive.
    pub save_responses: bool,

    /// MIME types eligible for body capture (exact match).
    pub capture_mime_types: FxHashSet<String>,

    /// Upper bound for awaiting pending body fetches when stopping.
    ///
    /// `None` waits as long as it takes.
    pub body_timeout: Option<Duration>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl CaptureOptions {
    /// Creates options with bodies disabled and the default MIME allow-list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            save_responses: false,
            capture_mime_types: DEFAULT_CAPTURE_MIME_TYPES
                .iter()
                .map(|mime| (*mime).to_string())
                .collect(),
            body_timeout: Some(DEFAULT_BODY_TIMEOUT),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl CaptureOptions {
    /// Enables or disables response body capture.
    #[inline]
    #[must_use]
    pub fn with_save_responses(mut self, save_responses: bool) -> Self {
        self.save_responses = save_responses;
        self
    }

    /// Adds a MIME type to the allow-list.
    #[inline]
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.capture_mime_types.insert(mime_type.into());
        self
    }

    /// Replaces the MIME allow-list.
    #[must_use]
    pub fn with_mime_types<I, M>(mut self, mime_types: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        self.capture_mime_types = mime_types.into_iter().map(Into::into).collect();
        self
    }

    /// Bounds the wait for pending body fetches at stop time.
    #[inline]
    #[must_use]
    pub fn with_body_timeout(mut self, timeout: Duration) -> Self {
        self.body_timeout = Some(timeout);
        self
    }

    /// Waits for pending body fetches without a bound.
    #[inline]
    #[must_use]
    pub fn without_body_timeout(mut self) -> Self {
        self.body_timeout = None;
        self
    }
}

// ============================================================================
// Queries
// ============================================================================

impl CaptureOptions {
    /// Returns `true` if bodies of `mime_type` are captured.
    #[inline]
    #[must_use]
    pub fn captures_mime_type(&self, mime_type: &str) -> bool {
        self.capture_mime_types.contains(mime_type)
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero body timeout or an empty MIME
    /// type entry.
    pub fn validate(&self) -> Result<()> {
        if self.body_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(Error::config("body timeout must be greater than zero"));
        }

        if self.capture_mime_types.iter().any(|mime| mime.trim().is_empty()) {
            return Err(Error::config("MIME type entries must not be empty"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CaptureOptions::default();
        assert!(!options.save_responses);
        assert!(options.captures_mime_type("text/html"));
        assert!(options.captures_mime_type("application/json"));
        assert!(!options.captures_mime_type("image/png"));
        assert_eq!(options.body_timeout, Some(DEFAULT_BODY_TIMEOUT));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = CaptureOptions::new()
            .with_save_responses(true)
            .with_mime_type("text/css")
            .without_body_timeout();

        assert!(options.save_responses);
        assert!(options.captures_mime_type("text/css"));
        assert!(options.captures_mime_type("text/html"));
        assert_eq!(options.body_timeout, None);
    }

    #[test]
    fn test_replace_mime_types() {
        let options = CaptureOptions::new().with_mime_types(["application/xml"]);
        assert!(options.captures_mime_type("application/xml"));
        assert!(!options.captures_mime_type("text/html"));
    }

    #[test]
    fn test_mime_match_is_exact() {
        let options = CaptureOptions::new();
        assert!(!options.captures_mime_type("text/html; charset=utf-8"));
        assert!(!options.captures_mime_type("TEXT/HTML"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let options = CaptureOptions::new().with_body_timeout(Duration::ZERO);
        assert!(matches!(options.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_blank_mime() {
        let options = CaptureOptions::new().with_mime_type("  ");
        assert!(matches!(options.validate(), Err(Error::Config { .. })));
    }
}
