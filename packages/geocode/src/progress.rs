//! Progress reporting for geocoding runs.
//!
//! The pipeline reports how many records have been geocoded through
//! [`ProgressCallback`] so the rendering backend (a terminal bar in the
//! CLI, nothing in tests) stays outside this crate.

/// Receives progress updates while a run geocodes its delta.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of records that will be submitted.
    fn set_total(&self, total: u64);

    /// Advances by `delta` records.
    fn inc(&self, delta: u64);

    /// Replaces the status message.
    fn set_message(&self, msg: String);

    /// Marks the run as finished with a closing message.
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
