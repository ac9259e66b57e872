//! Archive serialization.
//!
//! A capture ends as an ordered list of [`ObservedEvent`]s. An
//! [`ArchiveSerializer`] turns that list into the final archive;
//! [`HarSerializer`] produces HAR 1.2.

// ============================================================================
// Submodules
// ============================================================================

pub mod builder;
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{HAR_VERSION, HarSerializer};
pub use types::{
    Cache, Content, Cookie, Creator, Entry, Har, HarPage, HarRequest, HarResponse, Header, Log,
    PageTimings, PostData, QueryParam, Timings,
};

use crate::capture::ObservedEvent;
use crate::error::Result;

// ============================================================================
// ArchiveSerializer
// ============================================================================

/// Converts recorded events into an archive.
///
/// Implemented for closures, so a one-off serializer needs no type:
///
/// ```ignore
/// let count = capture
///     .stop_with(&|events: &[ObservedEvent], _: bool| Ok(events.len()))
///     .await?;
/// ```
pub trait ArchiveSerializer {
    /// Archive type produced.
    type Output;

    /// Serializes `events`, which are in archive order (page events first).
    ///
    /// `include_bodies` is `true` when response bodies were captured.
    ///
    /// # Errors
    ///
    /// Implementation-defined.
    fn serialize(&self, events: &[ObservedEvent], include_bodies: bool) -> Result<Self::Output>;
}

impl<F, T> ArchiveSerializer for F
where
    F: Fn(&[ObservedEvent], bool) -> Result<T>,
{
    type Output = T;

    fn serialize(&self, events: &[ObservedEvent], include_bodies: bool) -> Result<T> {
        self(events, include_bodies)
    }
}

// ============================================================================
// Tests
// ============================================================================
