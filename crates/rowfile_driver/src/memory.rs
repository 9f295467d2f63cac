//! In-memory driver for testing.

use crate::driver::{file_extension, normalize_extension, FileDriver, WriteMode};
use crate::driver::DEFAULT_MAX_RECORD_SIZE;
use crate::error::{DriverError, DriverResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory driver.
///
/// Files are kept as lists of chunks, mirroring the row layout of a
/// relational driver. Data survives `stop`/`start` and is only dropped by
/// `destroy`. Suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral brokers that don't need persistence
///
/// # Example
///
/// ```rust
/// use rowfile_driver::{FileDriver, InMemoryDriver, WriteMode};
///
/// let driver = InMemoryDriver::new();
/// driver.start().unwrap();
/// driver.write_file("a.data", b"hello", WriteMode::Append).unwrap();
///
/// let mut buf = [0u8; 5];
/// assert_eq!(driver.read_file("a.data", 0, &mut buf).unwrap(), 5);
/// assert_eq!(&buf, b"hello");
/// ```
#[derive(Debug)]
pub struct InMemoryDriver {
    started: AtomicBool,
    max_record_size: usize,
    files: RwLock<BTreeMap<String, Vec<Vec<u8>>>>,
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::with_max_record_size(DEFAULT_MAX_RECORD_SIZE)
    }
}

impl InMemoryDriver {
    /// Creates a new empty driver with the default record size.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty driver that splits data into chunks of at most
    /// `max_record_size` bytes.
    ///
    /// A size of zero is treated as one.
    #[must_use]
    pub fn with_max_record_size(max_record_size: usize) -> Self {
        Self {
            started: AtomicBool::new(false),
            max_record_size: max_record_size.max(1),
            files: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns whether the driver is started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Returns the number of chunks stored for `name`.
    ///
    /// Useful for testing chunk boundaries.
    #[must_use]
    pub fn chunk_count(&self, name: &str) -> usize {
        self.files.read().get(name).map_or(0, Vec::len)
    }

    /// Returns a copy of the whole content of `name`.
    #[must_use]
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.read().get(name).map(|chunks| chunks.concat())
    }

    fn ensure_started(&self) -> DriverResult<()> {
        if self.is_started() {
            Ok(())
        } else {
            Err(DriverError::NotStarted)
        }
    }

    fn append_chunks(&self, chunks: &mut Vec<Vec<u8>>, mut data: &[u8]) {
        let max = self.max_record_size;
        if let Some(last) = chunks.last_mut() {
            let room = max.saturating_sub(last.len()).min(data.len());
            last.extend_from_slice(&data[..room]);
            data = &data[room..];
        }
        chunks.extend(data.chunks(max).map(<[u8]>::to_vec));
    }
}

fn chunks_len(chunks: &[Vec<u8>]) -> u64 {
    chunks.iter().map(|c| c.len() as u64).sum()
}

impl FileDriver for InMemoryDriver {
    fn start(&self) -> DriverResult<()> {
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> DriverResult<()> {
        self.started.store(false, Ordering::Release);
        Ok(())
    }

    fn destroy(&self) -> DriverResult<()> {
        self.files.write().clear();
        Ok(())
    }

    fn max_record_size(&self) -> usize {
        self.max_record_size
    }

    fn list_files(&self, extension: &str) -> DriverResult<Vec<String>> {
        self.ensure_started()?;
        let extension = normalize_extension(extension);
        Ok(self
            .files
            .read()
            .keys()
            .filter(|name| file_extension(name) == extension)
            .cloned()
            .collect())
    }

    fn open_file(&self, name: &str) -> DriverResult<u64> {
        self.ensure_started()?;
        let mut files = self.files.write();
        let chunks = files.entry(name.to_string()).or_default();
        Ok(chunks_len(chunks))
    }

    fn file_size(&self, name: &str) -> DriverResult<Option<u64>> {
        self.ensure_started()?;
        Ok(self.files.read().get(name).map(|chunks| chunks_len(chunks)))
    }

    fn write_file(&self, name: &str, data: &[u8], mode: WriteMode) -> DriverResult<u64> {
        self.ensure_started()?;
        let mut files = self.files.write();
        let chunks = files.entry(name.to_string()).or_default();
        if mode == WriteMode::Overwrite {
            chunks.clear();
        }
        self.append_chunks(chunks, data);
        Ok(chunks_len(chunks))
    }

    fn read_file(&self, name: &str, offset: u64, buf: &mut [u8]) -> DriverResult<usize> {
        self.ensure_started()?;
        let files = self.files.read();
        let chunks = files
            .get(name)
            .ok_or_else(|| DriverError::file_not_found(name))?;

        let size = chunks_len(chunks);
        if offset > size {
            return Err(DriverError::ReadPastEnd {
                name: name.to_string(),
                offset,
                size,
            });
        }

        let mut read = 0;
        let mut chunk_start = 0u64;
        for chunk in chunks {
            if read == buf.len() {
                break;
            }
            let chunk_end = chunk_start + chunk.len() as u64;
            let pos = offset + read as u64;
            if pos < chunk_end {
                let from = (pos - chunk_start) as usize;
                let n = (chunk.len() - from).min(buf.len() - read);
                buf[read..read + n].copy_from_slice(&chunk[from..from + n]);
                read += n;
            }
            chunk_start = chunk_end;
        }
        Ok(read)
    }

    fn delete_file(&self, name: &str) -> DriverResult<()> {
        self.ensure_started()?;
        self.files.write().remove(name);
        Ok(())
    }

    fn rename_file(&self, from: &str, to: &str) -> DriverResult<()> {
        self.ensure_started()?;
        let mut files = self.files.write();
        if files.contains_key(to) {
            return Err(DriverError::file_exists(to));
        }
        let chunks = files
            .remove(from)
            .ok_or_else(|| DriverError::file_not_found(from))?;
        files.insert(to.to_string(), chunks);
        Ok(())
    }

    fn copy_file(&self, from: &str, to: &str) -> DriverResult<()> {
        self.ensure_started()?;
        let mut files = self.files.write();
        let chunks = files
            .get(from)
            .cloned()
            .ok_or_else(|| DriverError::file_not_found(from))?;
        files.insert(to.to_string(), chunks);
        Ok(())
    }
}
