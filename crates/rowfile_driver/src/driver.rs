//! Backend driver trait definition.

use crate::error::DriverResult;

/// Default largest chunk stored in one record (1 MiB).
pub const DEFAULT_MAX_RECORD_SIZE: usize = 1024 * 1024;

/// How a write is applied to the existing content of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Add the bytes after the current end of the file.
    Append,
    /// Replace the whole content of the file with the bytes.
    Overwrite,
}

/// A driver that stores named byte streams in a backend store.
///
/// Drivers are **opaque chunk stores**. Each file name maps to zero or more
/// chunks, none larger than [`max_record_size`](Self::max_record_size),
/// whose total length is the file size. Drivers do not know anything about
/// journal records or paging; callers own all format interpretation.
///
/// # Invariants
///
/// - Every per-file primitive fails with
///   [`DriverError::NotStarted`](crate::DriverError::NotStarted) before
///   `start` and after `stop`
/// - `read_file` returns exactly the bytes previously written at that offset
/// - `list_files` returns names sorted ascending
/// - Drivers must be `Send + Sync`; one instance is shared by every file
///
/// Callers serialize per-name access. A driver only has to keep its own
/// connection state consistent under concurrent calls for different names.
///
/// # Implementors
///
/// - [`super::InMemoryDriver`] - For testing
/// - `SqliteDriver` - Relational storage through SQLite (feature `sqlite`)
pub trait FileDriver: Send + Sync {
    /// Opens connections and creates the backing schema if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached or initialized.
    fn start(&self) -> DriverResult<()>;

    /// Releases connections. Stored data is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if closing the backend fails.
    fn stop(&self) -> DriverResult<()>;

    /// Removes all persisted storage, including the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses the teardown.
    fn destroy(&self) -> DriverResult<()>;

    /// Returns the largest chunk the backend stores in a single record.
    fn max_record_size(&self) -> usize;

    /// Lists the names of all files whose extension equals `extension`.
    ///
    /// The extension is compared without its leading dot.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend store does not exist or the query
    /// fails.
    fn list_files(&self, extension: &str) -> DriverResult<Vec<String>>;

    /// Creates the file if it is absent and returns its current size.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    fn open_file(&self, name: &str) -> DriverResult<u64>;

    /// Returns the size of the file, or `None` if no such file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    fn file_size(&self, name: &str) -> DriverResult<Option<u64>>;

    /// Writes `data` to the file and returns its new size.
    ///
    /// The file is created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails. A failed write leaves
    /// the previous content in place.
    fn write_file(&self, name: &str, data: &[u8], mode: WriteMode) -> DriverResult<u64>;

    /// Reads into `buf` starting at `offset` and returns the number of bytes
    /// read. Returns `0` at end of file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - `offset` is beyond the file size
    /// - The backend call fails
    fn read_file(&self, name: &str, offset: u64, buf: &mut [u8]) -> DriverResult<usize>;

    /// Removes the file and all its data. Deleting a missing file succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend call fails.
    fn delete_file(&self, name: &str) -> DriverResult<()>;

    /// Moves all data stored under `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` does not exist, `to` already exists, or
    /// the backend call fails.
    fn rename_file(&self, from: &str, to: &str) -> DriverResult<()>;

    /// Replaces the content of `to` with a copy of the content of `from`.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` does not exist or the backend call fails.
    fn copy_file(&self, from: &str, to: &str) -> DriverResult<()>;

    /// Makes previously acknowledged writes to the file durable.
    ///
    /// Backends that commit every statement have nothing to do here.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn sync_file(&self, _name: &str) -> DriverResult<()> {
        Ok(())
    }
}

/// Returns the extension of a file name: the text after the last `.`.
///
/// Names without a dot have an empty extension.
#[must_use]
pub fn file_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) => &name[pos + 1..],
        None => "",
    }
}

/// Strips a leading dot, so `".data"` and `"data"` select the same files.
#[must_use]
pub fn normalize_extension(extension: &str) -> &str {
    extension.strip_prefix('.').unwrap_or(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_after_last_dot() {
        assert_eq!(file_extension("a.data"), "data");
        assert_eq!(file_extension("page.0001.page"), "page");
        assert_eq!(file_extension("noext"), "");
        assert_eq!(file_extension("trailing."), "");
    }

    #[test]
    fn normalize_strips_one_dot() {
        assert_eq!(normalize_extension(".data"), "data");
        assert_eq!(normalize_extension("data"), "data");
        assert_eq!(normalize_extension(""), "");
    }
}
