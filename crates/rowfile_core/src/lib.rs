//! # rowfile core
//!
//! Sequential-file semantics on top of a relational backend.
//!
//! This crate lets a journal written against ordinary sequential files run
//! against rows in a database instead:
//! - [`FileStore`] creates, tracks, flushes and destroys files and owns the
//!   backend driver lifecycle
//! - [`VirtualFile`] presents read/write/sync/close on one named stream and
//!   serializes all access to that name
//! - [`CriticalErrorListener`] receives unrecoverable storage failures
//!
//! ## Consistency
//!
//! Operations on one file name are totally ordered through a per-name lock
//! shared by every handle for that name. Nothing is ordered across names,
//! and a flush of all files is best-effort.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
mod config;
mod error;
mod file;
mod listener;
mod lock;
mod store;

pub use config::{StoreConfig, DEFAULT_MAX_NAME_LEN};
pub use error::{CoreError, CoreResult};
pub use file::{FileId, FileState, VirtualFile};
pub use listener::{CriticalErrorListener, LoggingListener};
pub use lock::{FileLock, LockTable};
pub use store::FileStore;

pub use rowfile_driver::WriteMode;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
