//! The file store: factory and lifecycle owner of virtual files.

use crate::buffer;
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::file::{FileId, VirtualFile};
use crate::listener::CriticalErrorListener;
use crate::lock::LockTable;
use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use rowfile_driver::FileDriver;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Creates, tracks and bulk-operates on [`VirtualFile`]s.
///
/// A `FileStore` owns the backend driver, the per-name lock table and the
/// set of open files. It is the single point of lifecycle control for the
/// driver and the single place where unrecoverable failures are escalated
/// to the [`CriticalErrorListener`].
///
/// Failures follow three policies:
///
/// | Operation                     | On failure                         |
/// |-------------------------------|------------------------------------|
/// | `start`, `create_file`, sync in `flush_all` | reported to the listener, failure returned |
/// | `list_files`, `exists`        | returned to the caller only        |
/// | `stop`, `destroy`             | logged only                        |
///
/// `FileStore` is a cheap handle; clones share the same store.
///
/// # Example
///
/// ```rust
/// use rowfile_core::{FileStore, LoggingListener};
/// use rowfile_driver::{InMemoryDriver, WriteMode};
/// use std::sync::Arc;
///
/// let store = FileStore::new(Arc::new(InMemoryDriver::new()), Arc::new(LoggingListener));
/// store.start().unwrap();
///
/// let file = store.create_file("000001.journal").unwrap();
/// file.write(b"record", WriteMode::Append).unwrap();
/// assert_eq!(store.list_files("journal").unwrap(), vec!["000001.journal"]);
///
/// file.close().unwrap();
/// assert_eq!(store.open_file_count(), 0);
/// ```
#[derive(Clone)]
pub struct FileStore {
    inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    config: StoreConfig,
    started: Mutex<bool>,
    files: RwLock<HashMap<FileId, Arc<VirtualFile>>>,
    locks: LockTable,
    driver: Arc<dyn FileDriver>,
    listener: Arc<dyn CriticalErrorListener>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("config", &self.inner.config)
            .field("started", &self.is_started())
            .field("open_files", &self.open_file_count())
            .field("locks", &self.inner.locks.len())
            .finish()
    }
}

impl FileStore {
    /// Creates a store with the default configuration.
    ///
    /// The driver is not started until [`start`](Self::start).
    pub fn new(driver: Arc<dyn FileDriver>, listener: Arc<dyn CriticalErrorListener>) -> Self {
        Self::with_config(driver, listener, StoreConfig::default())
    }

    /// Creates a store with the given configuration.
    pub fn with_config(
        driver: Arc<dyn FileDriver>,
        listener: Arc<dyn CriticalErrorListener>,
        config: StoreConfig,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                started: Mutex::new(false),
                files: RwLock::new(HashMap::new()),
                locks: LockTable::new(),
                driver,
                listener,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Starts the driver if the store is not started yet.
    ///
    /// Concurrent callers are serialized; the driver is started at most once
    /// until the next [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// Returns the driver error if starting fails. The error has already
    /// been reported to the critical-error listener and the store stays
    /// stopped.
    pub fn start(&self) -> CoreResult<()> {
        let error = {
            let mut started = self.inner.started.lock();
            if *started {
                return Ok(());
            }
            match self.inner.driver.start() {
                Ok(()) => {
                    *started = true;
                    info!("file store started");
                    return Ok(());
                }
                Err(e) => CoreError::from(e),
            }
        };
        // The state lock is released before the listener runs.
        self.inner.escalate(&error, "unable to start database driver", None);
        Err(error)
    }

    /// Stops the driver. Always leaves the store stopped.
    ///
    /// A driver failure is logged and otherwise ignored.
    pub fn stop(&self) {
        let mut started = self.inner.started.lock();
        if let Err(e) = self.inner.driver.stop() {
            error!(error = %e, "error stopping file store, unable to close db connection");
        }
        if *started {
            info!("file store stopped");
        }
        *started = false;
    }

    /// Returns whether the store is started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        *self.inner.started.lock()
    }

    /// Creates a handle for the file `name` and starts tracking it.
    ///
    /// The handle shares the name's lock token with every other handle for
    /// the same name. Nothing is written to the backend until the file is
    /// opened or first written.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle cannot be constructed, e.g. because
    /// the name is not a usable backend key. The error has already been
    /// reported to the critical-error listener.
    pub fn create_file(&self, name: &str) -> CoreResult<Arc<VirtualFile>> {
        self.inner.create_file(name)
    }

    /// Stops tracking `file`.
    ///
    /// Closing an untracked file is a no-op. The lock table is not touched.
    /// Most callers use [`VirtualFile::close`], which calls this.
    pub fn close_file(&self, file: &VirtualFile) {
        self.inner.file_closed(file.id());
    }

    /// Returns the number of tracked files.
    #[must_use]
    pub fn open_file_count(&self) -> usize {
        self.inner.files.read().len()
    }

    /// Returns the number of lock tokens ever created.
    #[must_use]
    pub fn lock_count(&self) -> usize {
        self.inner.locks.len()
    }

    /// Lists the names of stored files with the given extension.
    ///
    /// # Errors
    ///
    /// Returns the driver error unchanged. Listing is how callers probe
    /// whether a store exists at all, so a failure here is never escalated.
    pub fn list_files(&self, extension: &str) -> CoreResult<Vec<String>> {
        Ok(self.inner.driver.list_files(extension)?)
    }

    /// Returns whether the backend holds a file called `name`.
    ///
    /// # Errors
    ///
    /// Returns the driver error unchanged.
    pub fn exists(&self, name: &str) -> CoreResult<bool> {
        Ok(self.inner.driver.file_size(name)?.is_some())
    }

    /// Syncs every tracked file.
    ///
    /// Works on a snapshot of the tracked set; files created or closed while
    /// the flush runs may or may not be included. A failing file is reported
    /// to the critical-error listener under its own name and the flush moves
    /// on to the next one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FlushFailed`] naming every file whose sync
    /// failed. Each of them has already been reported.
    pub fn flush_all(&self) -> CoreResult<()> {
        let snapshot: Vec<Arc<VirtualFile>> = self.inner.files.read().values().cloned().collect();

        let mut failed = Vec::new();
        for file in snapshot {
            if let Err(e) = file.sync() {
                let name = file.file_name();
                self.inner.escalate(&e, "error during file sync", Some(name));
                failed.push(name.to_string());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(CoreError::FlushFailed { files: failed })
        }
    }

    /// Removes all persisted storage.
    ///
    /// A driver failure is logged and otherwise ignored.
    pub fn destroy(&self) {
        let _started = self.inner.started.lock();
        match self.inner.driver.destroy() {
            Ok(()) => info!("file store destroyed"),
            Err(e) => error!(error = %e, "error destroying file store"),
        }
    }

    /// Reports a failure on behalf of a file to the critical-error listener.
    pub fn on_io_error(&self, error: &CoreError, message: &str, file_name: Option<&str>) {
        self.inner.escalate(error, message, file_name);
    }

    /// Returns the driver shared by all files.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn FileDriver> {
        &self.inner.driver
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Returns the preferred write buffer size: the driver's record size.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.inner.driver.max_record_size()
    }

    /// Whether writes are synced as part of every call. Never: every driver
    /// call is already committed when it returns.
    #[must_use]
    pub const fn is_datasync(&self) -> bool {
        false
    }

    /// Buffer alignment. Always [`buffer::ALIGNMENT`].
    #[must_use]
    pub const fn alignment(&self) -> usize {
        buffer::ALIGNMENT
    }

    /// Maximum concurrent I/O depth. Always [`buffer::MAX_IO`].
    #[must_use]
    pub const fn max_io(&self) -> usize {
        buffer::MAX_IO
    }

    /// See [`buffer::calculate_block_size`].
    #[must_use]
    pub const fn calculate_block_size(&self, bytes: usize) -> usize {
        buffer::calculate_block_size(bytes)
    }

    /// See [`buffer::new_buffer`].
    #[must_use]
    pub fn new_buffer(&self, size: usize) -> BytesMut {
        buffer::new_buffer(size)
    }

    /// See [`buffer::clear_buffer`].
    pub fn clear_buffer(&self, buf: &mut BytesMut) {
        buffer::clear_buffer(buf);
    }

    /// See [`buffer::wrap_buffer`].
    #[must_use]
    pub fn wrap_buffer(&self, bytes: Vec<u8>) -> Bytes {
        buffer::wrap_buffer(bytes)
    }

    /// See [`buffer::release_buffer`].
    pub fn release_buffer(&self, buf: BytesMut) {
        buffer::release_buffer(buf);
    }
}

impl StoreInner {
    pub(crate) fn create_file(self: &Arc<Self>, name: &str) -> CoreResult<Arc<VirtualFile>> {
        match self.build_file(name) {
            Ok(file) => {
                self.files.write().insert(file.id(), Arc::clone(&file));
                debug!(file = name, id = file.id().as_u64(), "file created");
                Ok(file)
            }
            Err(e) => {
                self.escalate(&e, "error whilst creating file", Some(name));
                Err(e)
            }
        }
    }

    fn build_file(self: &Arc<Self>, name: &str) -> CoreResult<Arc<VirtualFile>> {
        self.validate_name(name)?;
        let lock = self.locks.get_or_create(name);
        let id = FileId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        Ok(Arc::new(VirtualFile::new(
            id,
            name.to_string(),
            Arc::downgrade(self),
            lock,
            Arc::clone(&self.driver),
            self.config.sync_on_close,
        )))
    }

    pub(crate) fn validate_name(&self, name: &str) -> CoreResult<()> {
        if name.is_empty() {
            return Err(CoreError::invalid_file_name(name, "name is empty"));
        }
        if name.len() > self.config.max_name_len {
            return Err(CoreError::invalid_file_name(
                name,
                format!("name is longer than {} bytes", self.config.max_name_len),
            ));
        }
        if name.chars().any(char::is_control) {
            return Err(CoreError::invalid_file_name(
                name,
                "name contains control characters",
            ));
        }
        Ok(())
    }

    pub(crate) fn file_closed(&self, id: FileId) {
        if self.files.write().remove(&id).is_some() {
            debug!(id = id.as_u64(), "file closed");
        }
    }

    pub(crate) fn lock_table(&self) -> &LockTable {
        &self.locks
    }

    pub(crate) fn escalate(&self, error: &CoreError, message: &str, file_name: Option<&str>) {
        warn!(file = file_name.unwrap_or("-"), %error, "critical I/O error: {message}");
        self.listener.on_critical_error(error, message, file_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowfile_driver::{DriverError, DriverResult, InMemoryDriver, WriteMode};
    use std::sync::atomic::AtomicUsize;

    type Reports = Arc<Mutex<Vec<(String, Option<String>)>>>;

    fn recording_store(driver: Arc<dyn FileDriver>) -> (FileStore, Reports) {
        let reports: Reports = Arc::default();
        let sink = Arc::clone(&reports);
        let listener = move |_: &CoreError, message: &str, file: Option<&str>| {
            sink.lock().push((message.to_string(), file.map(str::to_string)));
        };
        (FileStore::new(driver, Arc::new(listener)), reports)
    }

    /// Driver whose `start` always fails and counts its calls.
    #[derive(Default)]
    struct BrokenDriver {
        inner: InMemoryDriver,
        starts: AtomicUsize,
    }

    impl FileDriver for BrokenDriver {
        fn start(&self) -> DriverResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Err(DriverError::backend("connection refused"))
        }
        fn stop(&self) -> DriverResult<()> {
            Err(DriverError::backend("already closed"))
        }
        fn destroy(&self) -> DriverResult<()> {
            Err(DriverError::backend("permission denied"))
        }
        fn max_record_size(&self) -> usize {
            self.inner.max_record_size()
        }
        fn list_files(&self, extension: &str) -> DriverResult<Vec<String>> {
            self.inner.list_files(extension)
        }
        fn open_file(&self, name: &str) -> DriverResult<u64> {
            self.inner.open_file(name)
        }
        fn file_size(&self, name: &str) -> DriverResult<Option<u64>> {
            self.inner.file_size(name)
        }
        fn write_file(&self, name: &str, data: &[u8], mode: WriteMode) -> DriverResult<u64> {
            self.inner.write_file(name, data, mode)
        }
        fn read_file(&self, name: &str, offset: u64, buf: &mut [u8]) -> DriverResult<usize> {
            self.inner.read_file(name, offset, buf)
        }
        fn delete_file(&self, name: &str) -> DriverResult<()> {
            self.inner.delete_file(name)
        }
        fn rename_file(&self, from: &str, to: &str) -> DriverResult<()> {
            self.inner.rename_file(from, to)
        }
        fn copy_file(&self, from: &str, to: &str) -> DriverResult<()> {
            self.inner.copy_file(from, to)
        }
    }

    #[test]
    fn start_failure_is_escalated_not_started() {
        let driver = Arc::new(BrokenDriver::default());
        let (store, reports) = recording_store(driver.clone());

        assert!(store.start().is_err());
        assert!(!store.is_started());
        assert_eq!(driver.starts.load(Ordering::SeqCst), 1);

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "unable to start database driver");
        assert_eq!(reports[0].1, None);
    }

    #[test]
    fn start_retries_after_failure() {
        let driver = Arc::new(BrokenDriver::default());
        let (store, _reports) = recording_store(driver.clone());
        let _ = store.start();
        let _ = store.start();
        assert_eq!(driver.starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_and_destroy_failures_are_not_escalated() {
        let (store, reports) = recording_store(Arc::new(BrokenDriver::default()));
        store.stop();
        store.destroy();
        assert!(!store.is_started());
        assert!(reports.lock().is_empty());
    }

    #[test]
    fn stop_is_idempotent() {
        let (store, _) = recording_store(Arc::new(InMemoryDriver::new()));
        store.start().unwrap();
        store.stop();
        store.stop();
        assert!(!store.is_started());
        store.start().unwrap();
        assert!(store.is_started());
    }

    #[test]
    fn create_rejects_bad_names() {
        let (store, reports) = recording_store(Arc::new(InMemoryDriver::new()));
        store.start().unwrap();

        for name in ["", "bad\nname"] {
            let result = store.create_file(name);
            assert!(matches!(result, Err(CoreError::InvalidFileName { .. })));
        }
        let long = "x".repeat(300);
        assert!(store.create_file(&long).is_err());

        assert_eq!(store.open_file_count(), 0);
        assert_eq!(store.lock_count(), 0);
        assert_eq!(reports.lock().len(), 3);
        assert_eq!(reports.lock()[0].0, "error whilst creating file");
    }

    #[test]
    fn create_tracks_and_close_untracks() {
        let (store, _) = recording_store(Arc::new(InMemoryDriver::new()));
        store.start().unwrap();

        let a = store.create_file("a.data").unwrap();
        let b = store.create_file("b.data").unwrap();
        assert_eq!(store.open_file_count(), 2);
        assert_ne!(a.id(), b.id());

        store.close_file(&a);
        assert_eq!(store.open_file_count(), 1);
        store.close_file(&a);
        assert_eq!(store.open_file_count(), 1);
        assert_eq!(store.lock_count(), 2);
    }

    #[test]
    fn list_failure_is_propagated_only() {
        let (store, reports) = recording_store(Arc::new(InMemoryDriver::new()));
        // Not started: the driver refuses to list.
        let result = store.list_files("data");
        assert!(matches!(
            result,
            Err(CoreError::Driver(DriverError::NotStarted))
        ));
        assert!(reports.lock().is_empty());
    }

    #[test]
    fn exists_reflects_backend() {
        let (store, _) = recording_store(Arc::new(InMemoryDriver::new()));
        store.start().unwrap();
        assert!(!store.exists("a.data").unwrap());
        store.create_file("a.data").unwrap().open().unwrap();
        assert!(store.exists("a.data").unwrap());
    }

    #[test]
    fn fixed_contract_values() {
        let driver = Arc::new(InMemoryDriver::with_max_record_size(4096));
        let (store, _) = recording_store(driver);
        assert_eq!(store.alignment(), 1);
        assert_eq!(store.max_io(), 1);
        assert_eq!(store.buffer_size(), 4096);
        assert_eq!(store.calculate_block_size(10), 10);
        assert!(!store.is_datasync());

        let mut buf = store.new_buffer(8);
        buf[0] = 7;
        store.clear_buffer(&mut buf);
        assert_eq!(&buf[..], &[0u8; 8]);
        store.release_buffer(buf);

        assert_eq!(&store.wrap_buffer(vec![1, 2])[..], &[1, 2]);
    }

    #[test]
    fn on_io_error_forwards_to_listener() {
        let (store, reports) = recording_store(Arc::new(InMemoryDriver::new()));
        store.on_io_error(&CoreError::StoreDropped, "page failure", Some("p.page"));
        assert_eq!(
            reports.lock().as_slice(),
            &[("page failure".to_string(), Some("p.page".to_string()))]
        );
    }
}
