//! Error types for rowfile core.

use rowfile_driver::DriverError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in file store and virtual file operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backend driver error.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// A file name cannot be used as a backend key.
    #[error("invalid file name {name:?}: {reason}")]
    InvalidFileName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The file handle has been closed.
    #[error("file is closed: {name}")]
    FileClosed {
        /// Name of the closed file.
        name: String,
    },

    /// The file store owning a handle no longer exists.
    #[error("file store has been dropped")]
    StoreDropped,

    /// One or more files failed to sync during a flush.
    #[error("failed to sync {} file(s): {}", files.len(), files.join(", "))]
    FlushFailed {
        /// Names of the files whose sync failed.
        files: Vec<String>,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid file name error.
    pub fn invalid_file_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFileName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a file closed error.
    pub fn file_closed(name: impl Into<String>) -> Self {
        Self::FileClosed { name: name.into() }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
