//! Virtual files: one named byte stream stored through the driver.

use crate::error::{CoreError, CoreResult};
use crate::lock::{lock_pair, FileLock};
use crate::store::StoreInner;
use parking_lot::Mutex;
use rowfile_driver::{file_extension, FileDriver, WriteMode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Identity of a file handle within its store.
///
/// Two handles for the same name have different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u64);

impl FileId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Lifecycle state of a [`VirtualFile`].
///
/// ```text
/// Created ──open/read/write──▶ Open ──close/delete/rename──▶ Closed
///    └──────────────close/delete/rename───────────────────────▲
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Handle exists; the backend has not been touched.
    Created,
    /// The backend file exists and positions are loaded.
    Open,
    /// Terminal. The handle is no longer tracked by its store.
    Closed,
}

/// A file-like handle on one named stream in the backend.
///
/// Every operation that reaches the driver holds the name's lock token for
/// its whole duration, so operations on one name are totally ordered across
/// all handles for that name. Operations on different names do not contend.
///
/// Handles are created by [`FileStore::create_file`](crate::FileStore::create_file)
/// and shared as `Arc<VirtualFile>`.
pub struct VirtualFile {
    id: FileId,
    name: String,
    store: Weak<StoreInner>,
    lock: FileLock,
    driver: Arc<dyn FileDriver>,
    state: Mutex<FileState>,
    write_position: AtomicU64,
    read_position: AtomicU64,
    sync_on_close: bool,
}

impl std::fmt::Debug for VirtualFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("size", &self.write_position.load(Ordering::Acquire))
            .field("position", &self.read_position.load(Ordering::Acquire))
            .finish()
    }
}

impl VirtualFile {
    pub(crate) fn new(
        id: FileId,
        name: String,
        store: Weak<StoreInner>,
        lock: FileLock,
        driver: Arc<dyn FileDriver>,
        sync_on_close: bool,
    ) -> Self {
        Self {
            id,
            name,
            store,
            lock,
            driver,
            state: Mutex::new(FileState::Created),
            write_position: AtomicU64::new(0),
            read_position: AtomicU64::new(0),
            sync_on_close,
        }
    }

    /// Returns the handle id.
    #[must_use]
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Returns the file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.name
    }

    /// Returns the text after the last `.` of the name, or `""`.
    #[must_use]
    pub fn extension(&self) -> &str {
        file_extension(&self.name)
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> FileState {
        *self.state.lock()
    }

    /// Returns whether the handle is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == FileState::Open
    }

    /// Returns whether this handle and `other` share one lock token.
    #[must_use]
    pub fn shares_lock_with(&self, other: &VirtualFile) -> bool {
        Arc::ptr_eq(&self.lock, &other.lock)
    }

    /// Opens the file, creating it in the backend if absent, and loads its
    /// size. Opening an open file does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FileClosed`] on a closed handle, or the driver
    /// error.
    pub fn open(&self) -> CoreResult<()> {
        let _guard = self.lock.lock();
        self.ensure_open()
    }

    /// Writes `data` and returns the number of bytes written.
    ///
    /// Opens the file first if needed. The call returns once the driver has
    /// acknowledged the write.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FileClosed`] on a closed handle, or the driver
    /// error. A failed write leaves the positions unchanged.
    pub fn write(&self, data: &[u8], mode: WriteMode) -> CoreResult<usize> {
        let _guard = self.lock.lock();
        self.ensure_open()?;
        let size = self.driver.write_file(&self.name, data, mode)?;
        self.write_position.store(size, Ordering::Release);
        if mode == WriteMode::Overwrite {
            self.read_position.fetch_min(size, Ordering::AcqRel);
        }
        Ok(data.len())
    }

    /// Appends `data`. Shorthand for [`write`](Self::write) with
    /// [`WriteMode::Append`].
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    pub fn append(&self, data: &[u8]) -> CoreResult<usize> {
        self.write(data, WriteMode::Append)
    }

    /// Reads into `buf` from the read position and advances it.
    ///
    /// The read position is first clamped to the stored size, which other
    /// handles for the same name may have shrunk. Returns the number of
    /// bytes read, `0` at end of file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FileClosed`] on a closed handle, or the driver
    /// error.
    pub fn read(&self, buf: &mut [u8]) -> CoreResult<usize> {
        let _guard = self.lock.lock();
        self.ensure_open()?;
        let size = self.stored_size()?;
        let position = self.read_position.load(Ordering::Acquire).min(size);
        let n = self.driver.read_file(&self.name, position, buf)?;
        self.read_position.store(position + n as u64, Ordering::Release);
        Ok(n)
    }

    /// Makes acknowledged writes durable.
    ///
    /// Nothing to do on a handle that was never opened or is already
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    pub fn sync(&self) -> CoreResult<()> {
        let _guard = self.lock.lock();
        if self.state() != FileState::Open {
            return Ok(());
        }
        self.driver.sync_file(&self.name)?;
        Ok(())
    }

    /// Closes the handle and stops its store from tracking it.
    ///
    /// Closing a closed handle does nothing. With `sync_on_close`, an open
    /// handle is synced first.
    ///
    /// # Errors
    ///
    /// Returns the sync error. The handle is closed and untracked anyway.
    pub fn close(&self) -> CoreResult<()> {
        let previous = self.mark_closed();
        if previous == FileState::Closed {
            return Ok(());
        }

        let result = if previous == FileState::Open && self.sync_on_close {
            let _guard = self.lock.lock();
            self.driver.sync_file(&self.name).map_err(CoreError::from)
        } else {
            Ok(())
        };

        self.deregister();
        result
    }

    /// Removes the file's data from the backend and closes the handle.
    ///
    /// The name's lock token stays in the store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FileClosed`] on a closed handle, or the driver
    /// error. The handle stays usable if the delete
    /// fails.
    pub fn delete(&self) -> CoreResult<()> {
        {
            let _guard = self.lock.lock();
            self.ensure_not_closed()?;
            self.driver.delete_file(&self.name)?;
            self.mark_closed();
        }
        debug!(file = %self.name, "file deleted");
        self.deregister();
        Ok(())
    }

    /// Returns whether the backend holds data for this name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FileClosed`] on a closed handle, or the driver
    /// error.
    pub fn exists(&self) -> CoreResult<bool> {
        let _guard = self.lock.lock();
        self.ensure_not_closed()?;
        Ok(self.driver.file_size(&self.name)?.is_some())
    }

    /// Returns the size stored in the backend (`0` if absent), including
    /// writes made through other handles for the same name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::FileClosed`] on a closed handle, or the driver
    /// error.
    pub fn size(&self) -> CoreResult<u64> {
        let _guard = self.lock.lock();
        self.ensure_not_closed()?;
        self.stored_size()
    }

    /// Returns the read position.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.read_position.load(Ordering::Acquire)
    }

    /// Moves the read position. Reading past the end fails in the driver.
    pub fn seek(&self, position: u64) {
        let _guard = self.lock.lock();
        self.read_position.store(position, Ordering::Release);
    }

    /// Preallocates `size` bytes. The backend grows on demand, so this
    /// does nothing.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn fill(&self, _size: u64) -> CoreResult<()> {
        Ok(())
    }

    /// Creates a new handle on the same name through the owning store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreDropped`] if the store is gone, or the
    /// creation error (already reported by the store).
    pub fn clone_file(&self) -> CoreResult<Arc<VirtualFile>> {
        self.upgrade_store()?.create_file(&self.name)
    }

    /// Moves the file's data to `new_name`, closes this handle and returns a
    /// handle for the new name.
    ///
    /// Both names' locks are held while the driver renames.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is closed, the names are equal, the
    /// store is gone, or the driver rename fails. This handle stays usable
    /// if the rename fails.
    pub fn rename_to(&self, new_name: &str) -> CoreResult<Arc<VirtualFile>> {
        if new_name == self.name {
            return Err(CoreError::invalid_operation(format!(
                "cannot rename {} onto itself",
                self.name
            )));
        }
        let store = self.upgrade_store()?;
        store.validate_name(new_name)?;
        let target_lock = store.lock_table().get_or_create(new_name);
        {
            let _guards = lock_pair((self.name.as_str(), &self.lock), (new_name, &target_lock));
            if self.state() == FileState::Closed {
                return Err(CoreError::file_closed(&self.name));
            }
            self.driver.rename_file(&self.name, new_name)?;
            self.mark_closed();
        }
        debug!(from = %self.name, to = new_name, "file renamed");
        store.file_closed(self.id);
        store.create_file(new_name)
    }

    /// Replaces the content of `target` with a copy of this file's content.
    ///
    /// Both names' locks are held while the driver copies. `target` is
    /// opened if it was only created.
    ///
    /// # Errors
    ///
    /// Returns an error if either handle is closed, both handles name the
    /// same file, or the driver copy fails.
    pub fn copy_to(&self, target: &VirtualFile) -> CoreResult<()> {
        if target.name == self.name {
            return Err(CoreError::invalid_operation(format!(
                "cannot copy {} onto itself",
                self.name
            )));
        }
        let _guards = lock_pair(
            (self.name.as_str(), &self.lock),
            (target.name.as_str(), &target.lock),
        );
        if self.state() == FileState::Closed {
            return Err(CoreError::file_closed(&self.name));
        }
        let mut target_state = target.state.lock();
        if *target_state == FileState::Closed {
            return Err(CoreError::file_closed(&target.name));
        }

        self.driver.copy_file(&self.name, &target.name)?;
        let size = self.driver.file_size(&target.name)?.unwrap_or(0);
        target.write_position.store(size, Ordering::Release);
        target.read_position.store(0, Ordering::Release);
        *target_state = FileState::Open;
        Ok(())
    }

    /// Moves a created handle to open. Callers hold the name lock.
    fn ensure_open(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        match *state {
            FileState::Open => Ok(()),
            FileState::Closed => Err(CoreError::file_closed(&self.name)),
            FileState::Created => {
                let size = self.driver.open_file(&self.name)?;
                self.write_position.store(size, Ordering::Release);
                self.read_position.store(0, Ordering::Release);
                *state = FileState::Open;
                Ok(())
            }
        }
    }

    fn ensure_not_closed(&self) -> CoreResult<()> {
        if self.state() == FileState::Closed {
            Err(CoreError::file_closed(&self.name))
        } else {
            Ok(())
        }
    }

    /// Re-reads the stored size into the write position. Callers hold the
    /// name lock.
    fn stored_size(&self) -> CoreResult<u64> {
        let size = self.driver.file_size(&self.name)?.unwrap_or(0);
        self.write_position.store(size, Ordering::Release);
        Ok(size)
    }

    fn mark_closed(&self) -> FileState {
        std::mem::replace(&mut *self.state.lock(), FileState::Closed)
    }

    fn deregister(&self) {
        if let Some(store) = self.store.upgrade() {
            store.file_closed(self.id);
        }
    }

    fn upgrade_store(&self) -> CoreResult<Arc<StoreInner>> {
        self.store.upgrade().ok_or(CoreError::StoreDropped)
    }
}

#[cfg(test)]
mod tests {
    use crate::{CoreError, FileState, FileStore, LoggingListener};
    use rowfile_driver::{InMemoryDriver, WriteMode};
    use std::sync::Arc;

    fn store() -> FileStore {
        let store = FileStore::new(
            Arc::new(InMemoryDriver::with_max_record_size(4)),
            Arc::new(LoggingListener),
        );
        store.start().unwrap();
        store
    }

    #[test]
    fn created_until_first_use() {
        let store = store();
        let file = store.create_file("a.data").unwrap();
        assert_eq!(file.state(), FileState::Created);
        assert!(!file.exists().unwrap());

        file.open().unwrap();
        assert!(file.is_open());
        assert!(file.exists().unwrap());
    }

    #[test]
    fn write_then_read_back() {
        let store = store();
        let file = store.create_file("a.data").unwrap();

        assert_eq!(file.append(b"hello ").unwrap(), 6);
        assert_eq!(file.append(b"world").unwrap(), 5);
        assert_eq!(file.size().unwrap(), 11);

        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"hello wo");
        assert_eq!(file.position(), 8);

        assert_eq!(file.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"rld");
        assert_eq!(file.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn overwrite_clamps_read_position() {
        let store = store();
        let file = store.create_file("a.data").unwrap();
        file.append(b"0123456789").unwrap();
        file.seek(8);

        file.write(b"abc", WriteMode::Overwrite).unwrap();
        assert_eq!(file.size().unwrap(), 3);
        assert_eq!(file.position(), 3);

        file.seek(0);
        let mut buf = [0u8; 3];
        file.read(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn open_loads_existing_size() {
        let store = store();
        let first = store.create_file("a.data").unwrap();
        first.append(b"12345").unwrap();
        first.close().unwrap();

        let second = store.create_file("a.data").unwrap();
        assert_eq!(second.size().unwrap(), 5);
        second.open().unwrap();
        second.append(b"6").unwrap();
        assert_eq!(second.size().unwrap(), 6);
    }

    #[test]
    fn closed_handle_rejects_io() {
        let store = store();
        let file = store.create_file("a.data").unwrap();
        file.append(b"x").unwrap();
        file.close().unwrap();

        assert!(matches!(file.append(b"y"), Err(CoreError::FileClosed { .. })));
        let mut buf = [0u8; 1];
        assert!(matches!(file.read(&mut buf), Err(CoreError::FileClosed { .. })));
        assert!(matches!(file.open(), Err(CoreError::FileClosed { .. })));
        assert!(file.sync().is_ok());
    }

    #[test]
    fn closed_handle_cannot_touch_live_data() {
        let store = store();
        let old = store.create_file("a.journal").unwrap();
        old.append(b"old").unwrap();
        old.close().unwrap();

        let live = store.create_file("a.journal").unwrap();
        live.append(b"live data").unwrap();

        assert!(matches!(old.delete(), Err(CoreError::FileClosed { .. })));
        assert!(matches!(old.exists(), Err(CoreError::FileClosed { .. })));
        assert!(matches!(old.size(), Err(CoreError::FileClosed { .. })));

        assert!(store.exists("a.journal").unwrap());
        assert_eq!(live.size().unwrap(), 12);
    }

    #[test]
    fn handles_see_writes_through_each_other() {
        let store = store();
        let a = store.create_file("a.journal").unwrap();
        let b = store.create_file("a.journal").unwrap();

        a.append(b"0123456789").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(a.read(&mut buf).unwrap(), 8);

        b.write(b"xy", WriteMode::Overwrite).unwrap();
        assert_eq!(a.size().unwrap(), 2);
        assert_eq!(a.read(&mut buf).unwrap(), 0);
        assert_eq!(a.position(), 2);

        b.append(b"z").unwrap();
        assert_eq!(a.size().unwrap(), 3);
        assert_eq!(a.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'z');
    }

    #[test]
    fn close_twice_is_noop() {
        let store = store();
        let file = store.create_file("a.data").unwrap();
        file.open().unwrap();

        file.close().unwrap();
        file.close().unwrap();
        assert_eq!(file.state(), FileState::Closed);
        assert_eq!(store.open_file_count(), 0);
        assert_eq!(store.lock_count(), 1);
    }

    #[test]
    fn delete_keeps_lock_token() {
        let store = store();
        let file = store.create_file("a.data").unwrap();
        file.append(b"data").unwrap();

        file.delete().unwrap();
        assert!(!store.exists("a.data").unwrap());
        assert_eq!(file.state(), FileState::Closed);
        assert_eq!(store.open_file_count(), 0);
        assert_eq!(store.lock_count(), 1);

        let again = store.create_file("a.data").unwrap();
        assert!(again.shares_lock_with(&file));
    }

    #[test]
    fn rename_moves_data_and_handle() {
        let store = store();
        let file = store.create_file("a.tmp").unwrap();
        file.append(b"payload").unwrap();

        let renamed = file.rename_to("a.data").unwrap();
        assert_eq!(file.state(), FileState::Closed);
        assert_eq!(renamed.file_name(), "a.data");
        assert_eq!(renamed.size().unwrap(), 7);
        assert!(!store.exists("a.tmp").unwrap());
        assert_eq!(store.open_file_count(), 1);
        assert_eq!(store.list_files("data").unwrap(), vec!["a.data"]);
    }

    #[test]
    fn rename_onto_itself_fails() {
        let store = store();
        let file = store.create_file("a.data").unwrap();
        file.open().unwrap();
        let result = file.rename_to("a.data");
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
        assert!(file.is_open());
    }

    #[test]
    fn rename_onto_existing_fails_and_keeps_handle() {
        let store = store();
        store.create_file("b.data").unwrap().open().unwrap();
        let file = store.create_file("a.data").unwrap();
        file.append(b"x").unwrap();

        assert!(file.rename_to("b.data").is_err());
        assert!(file.is_open());
        assert_eq!(file.size().unwrap(), 1);
    }

    #[test]
    fn copy_replaces_target_content() {
        let store = store();
        let source = store.create_file("a.data").unwrap();
        source.append(b"source bytes").unwrap();
        let target = store.create_file("b.data").unwrap();

        source.copy_to(&target).unwrap();
        assert!(target.is_open());
        assert_eq!(target.size().unwrap(), 12);

        let mut buf = [0u8; 12];
        target.read(&mut buf).unwrap();
        assert_eq!(&buf, b"source bytes");
    }

    #[test]
    fn clone_shares_name_and_lock() {
        let store = store();
        let file = store.create_file("a.data").unwrap();
        let clone = file.clone_file().unwrap();
        assert_ne!(file.id(), clone.id());
        assert_eq!(clone.file_name(), "a.data");
        assert!(clone.shares_lock_with(&file));
        assert_eq!(store.open_file_count(), 2);
    }

    #[test]
    fn clone_after_store_dropped_fails() {
        let file = store().create_file("a.data").unwrap();
        assert!(matches!(file.clone_file(), Err(CoreError::StoreDropped)));
        // Closing without a store still works.
        file.close().unwrap();
    }

    #[test]
    fn fill_leaves_content_alone() {
        let store = store();
        let file = store.create_file("a.data").unwrap();
        file.append(b"abc").unwrap();
        file.fill(1024).unwrap();
        assert_eq!(file.size().unwrap(), 3);
    }

    #[test]
    fn extension_from_name() {
        let store = store();
        assert_eq!(store.create_file("0001.page").unwrap().extension(), "page");
        assert_eq!(store.create_file("manifest").unwrap().extension(), "");
    }
}
