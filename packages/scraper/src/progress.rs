//! Progress reporting for the crawl and extraction phases.
//!
//! The phases report through [`ProgressCallback`] so they stay unaware of
//! how (or whether) progress is rendered. The CLI plugs in `indicatif` bars;
//! tests and library callers use [`null_progress`].

use std::sync::Arc;

/// Receives progress updates from a running phase.
///
/// Shared behind an `Arc` across concurrently running category crawls and
/// extraction workers, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Total units of work, once known (catalog entries, categories).
    fn set_total(&self, total: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the status message (current category, current URL).
    fn set_message(&self, msg: String);

    /// Completes the indicator, leaving `msg` behind.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// A shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
