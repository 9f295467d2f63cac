//! Critical error escalation.
//!
//! The file store reports unrecoverable storage failures through a
//! [`CriticalErrorListener`] instead of returning them up the journal's call
//! stack. The surrounding broker decides what to do (shut down, fail over).
//! Notifications are fire-and-forget: the store never waits on, retries, or
//! inspects anything a listener does.

use crate::error::CoreError;
use tracing::error;

/// A sink for unrecoverable I/O conditions.
///
/// Closures with the matching signature implement this trait:
///
/// ```rust
/// use rowfile_core::{CoreError, CriticalErrorListener};
///
/// let listener = |error: &CoreError, message: &str, file: Option<&str>| {
///     eprintln!("{message} ({file:?}): {error}");
/// };
/// listener.on_critical_error(&CoreError::StoreDropped, "example", None);
/// ```
pub trait CriticalErrorListener: Send + Sync {
    /// Called once per critical failure.
    ///
    /// `file_name` is set when the failure belongs to one file.
    fn on_critical_error(&self, error: &CoreError, message: &str, file_name: Option<&str>);
}

impl<F> CriticalErrorListener for F
where
    F: Fn(&CoreError, &str, Option<&str>) + Send + Sync,
{
    fn on_critical_error(&self, error: &CoreError, message: &str, file_name: Option<&str>) {
        self(error, message, file_name);
    }
}

/// A listener that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl CriticalErrorListener for LoggingListener {
    fn on_critical_error(&self, error: &CoreError, message: &str, file_name: Option<&str>) {
        error!(file = file_name.unwrap_or("-"), %error, "{message}");
    }
}
