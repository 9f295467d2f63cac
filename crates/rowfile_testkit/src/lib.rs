//! # rowfile testkit
//!
//! Test utilities for rowfile.
//!
//! This crate provides:
//! - An instrumented driver recording call intervals, with delays and
//!   fault injection
//! - Concurrent stress helpers
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use rowfile_driver::{FileDriver, WriteMode};
//! use rowfile_testkit::prelude::*;
//!
//! let driver = InstrumentedDriver::new();
//! driver.start().unwrap();
//! driver.write_file("a.data", b"x", WriteMode::Append).unwrap();
//! assert!(find_overlap(&driver.calls_for("a.data")).is_none());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod generators;
pub mod instrumented;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::generators::*;
    pub use crate::instrumented::*;
    pub use crate::stress::*;
}

pub use generators::*;
pub use instrumented::*;
pub use stress::*;
