//! Capture session lifecycle.
//!
//! [`capture_network`] opens a protocol session on a page, enables the
//! `Page` and `Network` domains and starts recording. The returned
//! [`NetworkCapture`] is the only way to end the capture, and ending it
//! consumes the handle.
//!
//! # Example
//!
//! ```ignore
//! use har_capture::{CaptureOptions, PageTarget, capture_network};
//!
//! let page = PageTarget::new("ws://127.0.0.1:9222/devtools/page/ABC")?;
//! let capture = capture_network(&page, CaptureOptions::new().with_save_responses(true)).await?;
//!
//! // ... drive the page ...
//!
//! let har = capture.stop().await?;
//! println!("{}", har.to_json_pretty()?);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::har::{ArchiveSerializer, Har, HarSerializer};
use crate::protocol::event::{NETWORK_EVENTS, PAGE_EVENTS};
use crate::protocol::{NETWORK_DOMAIN, PAGE_DOMAIN};
use crate::session::{Page, Session};

use super::observer::{EventObserver, ObservedEvent};
use super::options::CaptureOptions;
use super::responses::ResponseCapturer;

// ============================================================================
// capture_network
// ============================================================================

/// Starts capturing network activity of `page`.
///
/// # Errors
///
/// - [`Error::Config`] if `options` are invalid; no session is opened
/// - any error from opening the session
/// - [`Error::DomainEnable`] if a domain cannot be enabled; the session is
///   detached before returning
pub async fn capture_network<P: Page>(
    page: &P,
    options: CaptureOptions,
) -> Result<NetworkCapture<P::Session>> {
    options.validate()?;

    let session = Arc::new(page.create_session().await?);

    for domain in [PAGE_DOMAIN, NETWORK_DOMAIN] {
        if let Err(e) = session.enable_domain(domain).await {
            warn!(domain, error = %e, "Failed to enable domain, detaching session");
            if let Err(detach_err) = session.detach().await {
                warn!(error = %detach_err, "Failed to detach session after setup error");
            }
            return Err(Error::domain_enable(domain, e));
        }
        debug!(domain, "Domain enabled");
    }

    let page_events = EventObserver::observe(&session, PAGE_EVENTS)?;
    let network_events = EventObserver::observe(&session, NETWORK_EVENTS)?;
    let responses = ResponseCapturer::attach(&session, &options);

    info!(save_responses = options.save_responses, "Network capture started");

    Ok(NetworkCapture {
        session,
        page_events,
        network_events,
        responses,
        options,
    })
}

// ============================================================================
// NetworkCapture
// ============================================================================

/// A running capture.
pub struct NetworkCapture<S: Session> {
    session: Arc<S>,
    page_events: EventObserver<S>,
    network_events: EventObserver<S>,
    responses: ResponseCapturer<S>,
    options: CaptureOptions,
}

impl<S: Session> fmt::Debug for NetworkCapture<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkCapture")
            .field("page_events", &self.page_events.len())
            .field("network_events", &self.network_events.len())
            .field("responses", &self.responses)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S: Session> NetworkCapture<S> {
    /// Returns the session the capture runs on, e.g. to drive the page.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    /// Returns the options the capture was started with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Stops the capture and builds a HAR archive.
    ///
    /// # Errors
    ///
    /// Returns the session's error if detaching fails.
    pub async fn stop(self) -> Result<Har> {
        self.stop_with(&HarSerializer::new()).await
    }

    /// Stops the capture and hands the events to `serializer`.
    ///
    /// # Errors
    ///
    /// Returns the session's error if detaching fails, or the serializer's.
    pub async fn stop_with<A: ArchiveSerializer>(self, serializer: &A) -> Result<A::Output> {
        let include_bodies = self.options.save_responses;
        let events = self.stop_events().await?;
        serializer.serialize(&events, include_bodies)
    }

    /// Stops the capture and returns the recorded events in archive order:
    /// page events first, then network events with bodies merged in.
    ///
    /// # Errors
    ///
    /// Returns the session's error if detaching fails.
    pub async fn stop_events(self) -> Result<Vec<ObservedEvent>> {
        let Self {
            session,
            page_events,
            network_events,
            responses,
            ..
        } = self;

        let mut events = page_events.stop();
        let network_events = network_events.stop();
        let page_count = events.len();

        let network_events = responses.merge(network_events).await;
        session.detach().await?;

        info!(
            page_events = page_count,
            network_events = network_events.len(),
            "Network capture stopped"
        );

        events.extend(network_events);
        Ok(events)
    }
}

// ============================================================================
// Tests
// ============================================================================
