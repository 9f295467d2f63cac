//! # rowfile driver
//!
//! Backend driver trait and implementations for rowfile.
//!
//! This crate provides the lowest-level storage abstraction of rowfile.
//! Drivers are **opaque chunk stores** - they persist named byte streams
//! as rows and do not interpret the data they store.
//!
//! ## Design Principles
//!
//! - Drivers are simple chunk stores (open, write, read, delete, list)
//! - No knowledge of journal records or paging formats
//! - Must be `Send + Sync`; one instance is shared by every open file
//! - Per-name serialization is the caller's job, not the driver's
//!
//! ## Available Drivers
//!
//! - [`InMemoryDriver`] - For testing and ephemeral storage
//! - [`SqliteDriver`] - Relational storage through SQLite (feature `sqlite`)
//!
//! ## Example
//!
//! ```rust
//! use rowfile_driver::{FileDriver, InMemoryDriver, WriteMode};
//!
//! let driver = InMemoryDriver::new();
//! driver.start().unwrap();
//! let size = driver.write_file("000001.journal", b"hello", WriteMode::Append).unwrap();
//! assert_eq!(size, 5);
//! assert_eq!(driver.list_files("journal").unwrap(), vec!["000001.journal"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use driver::{
    file_extension, normalize_extension, FileDriver, WriteMode, DEFAULT_MAX_RECORD_SIZE,
};
pub use error::{DriverError, DriverResult};
pub use memory::InMemoryDriver;
#[cfg(feature = "sqlite")]
pub use sqlite::{ChunkStats, SqliteConfig, SqliteDriver};
