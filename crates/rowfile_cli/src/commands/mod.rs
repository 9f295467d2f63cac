//! CLI command implementations.

pub mod cat;
pub mod destroy;
pub mod list;
pub mod rm;
pub mod stat;

use rowfile_core::{FileStore, LoggingListener};
use rowfile_driver::{SqliteConfig, SqliteDriver};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The store a command operates on.
pub struct Target {
    db: PathBuf,
    prefix: String,
}

impl Target {
    /// Creates a target for the tables named `prefix` in the database `db`.
    pub fn new(db: PathBuf, prefix: String) -> Self {
        Self { db, prefix }
    }

    /// Returns the database path.
    pub fn db(&self) -> &Path {
        &self.db
    }

    /// Opens and starts the store.
    pub fn open(&self) -> Result<FileStore, Box<dyn std::error::Error>> {
        self.open_with(self.driver()?)
    }

    /// Creates the SQLite driver for the target, unstarted.
    pub fn driver(&self) -> Result<Arc<SqliteDriver>, Box<dyn std::error::Error>> {
        if !self.db.exists() {
            return Err(format!("No database found at {:?}", self.db).into());
        }
        let config = SqliteConfig::new()
            .path(&self.db)
            .table_prefix(self.prefix.as_str());
        Ok(Arc::new(SqliteDriver::new(config)?))
    }

    /// Opens and starts a store over `driver`.
    pub fn open_with(&self, driver: Arc<SqliteDriver>) -> Result<FileStore, Box<dyn std::error::Error>> {
        let store = FileStore::new(driver, Arc::new(LoggingListener));
        store.start()?;
        Ok(store)
    }
}

/// Fails unless `name` is stored.
pub(crate) fn require_file(store: &FileStore, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    if store.exists(name)? {
        Ok(())
    } else {
        Err(format!("No such file: {name}").into())
    }
}
