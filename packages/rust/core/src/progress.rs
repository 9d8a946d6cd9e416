//! Progress reporting for long-running operations.

/// Progress callback for sync and build runs.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each item finishes, successfully or not.
    fn item_done(&self, label: &str, current: usize, total: usize);
    /// Called when an item fails and is excluded from the run.
    fn item_failed(&self, label: &str, error: &str);
    /// Called once at the end with a one-line summary.
    fn done(&self, summary: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_done(&self, _label: &str, _current: usize, _total: usize) {}
    fn item_failed(&self, _label: &str, _error: &str) {}
    fn done(&self, _summary: &str) {}
}
