//! Per-name lock table.
//!
//! Every file name gets one exclusive lock token the first time a file is
//! created under it. All handles for that name share the token, so reads,
//! writes and deletes on one name never interleave even across handles.
//!
//! Tokens are never removed, so a name maps to one token for the life of
//! the store. The table grows with the number of distinct names, which for
//! a journal is bounded by its file counts, not by traffic.

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::Arc;

/// An exclusive-access token for one file name.
pub type FileLock = Arc<Mutex<()>>;

/// Concurrent create-if-absent map from file name to [`FileLock`].
#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<String, FileLock>>,
}

impl LockTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token for `name`, creating it on first use.
    ///
    /// Concurrent callers with the same name always get the same token.
    pub fn get_or_create(&self, name: &str) -> FileLock {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(name) {
            return Arc::clone(lock);
        }
        let lock = FileLock::default();
        locks.insert(name.to_string(), Arc::clone(&lock));
        lock
    }

    /// Returns whether a token exists for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.locks.lock().contains_key(name)
    }

    /// Returns the number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

/// Acquires two name locks in name order.
///
/// Any two threads locking the same pair agree on the order, so they cannot
/// deadlock. The names must differ.
pub(crate) fn lock_pair<'a>(
    first: (&str, &'a FileLock),
    second: (&str, &'a FileLock),
) -> (MutexGuard<'a, ()>, MutexGuard<'a, ()>) {
    debug_assert_ne!(first.0, second.0);
    if first.0 < second.0 {
        let a = first.1.lock();
        let b = second.1.lock();
        (a, b)
    } else {
        let b = second.1.lock();
        let a = first.1.lock();
        (a, b)
    }
}
