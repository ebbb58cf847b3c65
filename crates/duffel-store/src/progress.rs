//! Progress reporting for archive assembly.

use std::error::Error;

/// Sink for store-reported assembly progress.
///
/// The store calls this synchronously on the assembly task, one event per
/// processed path, in the order the store reports them. Error events are
/// non-fatal: the store reports them and keeps assembling; a fatal failure
/// surfaces as the `assemble` call's own error instead.
pub trait ProgressSink: Send {
    /// One path was processed with the given status code (e.g. `"A"`).
    fn progress(&mut self, status_code: &str, path: &str);

    /// A non-fatal error occurred while processing the archive.
    fn error(&mut self, message: &str, source: &(dyn Error + 'static));
}
