//! An instrumented driver for concurrency and failure tests.
//!
//! [`InstrumentedDriver`] wraps another driver and records every per-file
//! call with the instants it entered and left the driver. Tests use the
//! recorded intervals to prove that calls on one name never overlapped, or
//! that calls on different names did. It can also slow calls down and
//! inject failures.

use parking_lot::Mutex;
use rowfile_driver::{DriverError, DriverResult, FileDriver, InMemoryDriver, WriteMode};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// The driver primitive a [`CallRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    /// `open_file`
    Open,
    /// `write_file`
    Write,
    /// `read_file`
    Read,
    /// `delete_file`
    Delete,
    /// `sync_file`
    Sync,
}

/// One observed per-file driver call.
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Which primitive was called.
    pub op: DriverOp,
    /// The file name passed to the driver.
    pub name: String,
    /// When the call entered the driver.
    pub entered: Instant,
    /// When the call left the driver.
    pub exited: Instant,
    /// The calling thread.
    pub thread: ThreadId,
}

impl CallRecord {
    /// Returns whether this call's interval intersects `other`'s.
    #[must_use]
    pub fn overlaps(&self, other: &CallRecord) -> bool {
        self.entered < other.exited && other.entered < self.exited
    }
}

/// A driver wrapper that records, delays and fails calls on demand.
///
/// Wraps an [`InMemoryDriver`] unless built with [`wrap`](Self::wrap).
pub struct InstrumentedDriver {
    inner: Box<dyn FileDriver>,
    delay: Mutex<Duration>,
    calls: Mutex<Vec<CallRecord>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: AtomicBool,
    fail_list: AtomicBool,
    failing_syncs: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
}

impl Default for InstrumentedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentedDriver {
    /// Creates an instrumented in-memory driver.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(Box::new(InMemoryDriver::new()))
    }

    /// Instruments an existing driver.
    #[must_use]
    pub fn wrap(inner: Box<dyn FileDriver>) -> Self {
        Self {
            inner,
            delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            fail_start: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            failing_syncs: Mutex::new(HashSet::new()),
            failing_writes: Mutex::new(HashSet::new()),
        }
    }

    /// Makes every recorded call sleep for `delay` inside the driver.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = delay;
        self
    }

    /// Changes the artificial delay.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Makes `start` fail (or succeed again).
    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Makes `list_files` fail (or succeed again).
    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Makes `sync_file` fail for `name`.
    pub fn fail_sync_for(&self, name: &str) {
        self.failing_syncs.lock().insert(name.to_string());
    }

    /// Makes `write_file` fail for `name`.
    pub fn fail_write_for(&self, name: &str) {
        self.failing_writes.lock().insert(name.to_string());
    }

    /// Returns how many times `start` reached the driver.
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Returns how many times `stop` reached the driver.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Returns a copy of all recorded calls, in completion order.
    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    /// Returns the recorded calls for `name`, in completion order.
    #[must_use]
    pub fn calls_for(&self, name: &str) -> Vec<CallRecord> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.name == name)
            .cloned()
            .collect()
    }

    /// Returns how many `op` calls were recorded for `name`.
    #[must_use]
    pub fn count(&self, op: DriverOp, name: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.op == op && c.name == name)
            .count()
    }

    /// Forgets all recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record<T>(&self, op: DriverOp, name: &str, f: impl FnOnce() -> DriverResult<T>) -> DriverResult<T> {
        let entered = Instant::now();
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let result = f();
        let exited = Instant::now();
        self.calls.lock().push(CallRecord {
            op,
            name: name.to_string(),
            entered,
            exited,
            thread: thread::current().id(),
        });
        result
    }
}

/// Returns the first pair of calls in `calls` whose intervals overlap.
#[must_use]
pub fn find_overlap(calls: &[CallRecord]) -> Option<(&CallRecord, &CallRecord)> {
    let mut sorted: Vec<&CallRecord> = calls.iter().collect();
    sorted.sort_by_key(|c| c.entered);
    sorted
        .windows(2)
        .find(|pair| pair[0].overlaps(pair[1]))
        .map(|pair| (pair[0], pair[1]))
}

impl FileDriver for InstrumentedDriver {
    fn start(&self) -> DriverResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(DriverError::backend("injected start failure"));
        }
        self.inner.start()
    }

    fn stop(&self) -> DriverResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.inner.stop()
    }

    fn destroy(&self) -> DriverResult<()> {
        self.inner.destroy()
    }

    fn max_record_size(&self) -> usize {
        self.inner.max_record_size()
    }

    fn list_files(&self, extension: &str) -> DriverResult<Vec<String>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(DriverError::backend("injected list failure"));
        }
        self.inner.list_files(extension)
    }

    fn open_file(&self, name: &str) -> DriverResult<u64> {
        self.record(DriverOp::Open, name, || self.inner.open_file(name))
    }

    fn file_size(&self, name: &str) -> DriverResult<Option<u64>> {
        self.inner.file_size(name)
    }

    fn write_file(&self, name: &str, data: &[u8], mode: WriteMode) -> DriverResult<u64> {
        self.record(DriverOp::Write, name, || {
            if self.failing_writes.lock().contains(name) {
                return Err(DriverError::backend("injected write failure"));
            }
            self.inner.write_file(name, data, mode)
        })
    }

    fn read_file(&self, name: &str, offset: u64, buf: &mut [u8]) -> DriverResult<usize> {
        self.record(DriverOp::Read, name, || self.inner.read_file(name, offset, buf))
    }

    fn delete_file(&self, name: &str) -> DriverResult<()> {
        self.record(DriverOp::Delete, name, || self.inner.delete_file(name))
    }

    fn rename_file(&self, from: &str, to: &str) -> DriverResult<()> {
        self.inner.rename_file(from, to)
    }

    fn copy_file(&self, from: &str, to: &str) -> DriverResult<()> {
        self.inner.copy_file(from, to)
    }

    fn sync_file(&self, name: &str) -> DriverResult<()> {
        self.record(DriverOp::Sync, name, || {
            if self.failing_syncs.lock().contains(name) {
                return Err(DriverError::backend("injected sync failure"));
            }
            self.inner.sync_file(name)
        })
    }
}
