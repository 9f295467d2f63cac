//! Error types for driver operations.

use std::io;
use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors that can occur while a driver executes a storage primitive.
#[derive(Debug, Error)]
pub enum DriverError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The SQLite backend rejected a statement.
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The driver was used before `start` or after `stop`.
    #[error("driver is not started")]
    NotStarted,

    /// No data is stored under the given file name.
    #[error("file not found: {name}")]
    FileNotFound {
        /// The missing file name.
        name: String,
    },

    /// A rename or copy target already holds data.
    #[error("file already exists: {name}")]
    FileExists {
        /// The conflicting file name.
        name: String,
    },

    /// Attempted to read beyond the end of a file.
    #[error("read beyond end of file {name}: offset {offset}, size {size}")]
    ReadPastEnd {
        /// The file being read.
        name: String,
        /// The requested read offset.
        offset: u64,
        /// The current file size.
        size: u64,
    },

    /// The driver configuration is unusable.
    #[error("invalid driver configuration: {0}")]
    InvalidConfig(String),

    /// The backend store holds data the driver cannot interpret.
    #[error("backend corrupted: {0}")]
    Corrupted(String),

    /// A failure raised by a backend without a dedicated variant.
    #[error("backend error: {0}")]
    Backend(String),
}

impl DriverError {
    /// Creates a file-not-found error.
    pub fn file_not_found(name: impl Into<String>) -> Self {
        Self::FileNotFound { name: name.into() }
    }

    /// Creates a file-exists error.
    pub fn file_exists(name: impl Into<String>) -> Self {
        Self::FileExists { name: name.into() }
    }

    /// Creates a generic backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
