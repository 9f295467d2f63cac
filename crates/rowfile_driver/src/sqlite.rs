//! SQLite driver for relational storage.
//!
//! Files are stored in two tables sharing a configurable prefix:
//!
//! ```text
//! <prefix>_files   (filename TEXT PRIMARY KEY, extension TEXT, size INTEGER)
//! <prefix>_chunks  (filename TEXT, pos INTEGER, data BLOB,
//!                   PRIMARY KEY (filename, pos))
//! ```
//!
//! `pos` is the byte offset of the chunk within its file. Chunks never
//! exceed the configured record size. Every write runs in one transaction,
//! so a failed statement leaves the previous content of the file intact.

use crate::driver::{file_extension, normalize_extension, FileDriver, WriteMode};
use crate::driver::DEFAULT_MAX_RECORD_SIZE;
use crate::error::{DriverError, DriverResult};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Configuration for a [`SqliteDriver`].
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file. `None` keeps the database in memory.
    pub path: Option<PathBuf>,

    /// Prefix for the table names. Must be a plain SQL identifier.
    pub table_prefix: String,

    /// Largest chunk stored in one row.
    pub max_record_size: usize,

    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            table_prefix: "rowfile".to_string(),
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl SqliteConfig {
    /// Creates a configuration for an in-memory database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the database in the file at `path`.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the table name prefix.
    #[must_use]
    pub fn table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Sets the largest chunk stored in one row.
    #[must_use]
    pub const fn max_record_size(mut self, size: usize) -> Self {
        self.max_record_size = size;
        self
    }

    /// Sets the busy timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    fn validate(&self) -> DriverResult<()> {
        let mut chars = self.table_prefix.chars();
        let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(DriverError::InvalidConfig(format!(
                "table prefix is not a plain identifier: {:?}",
                self.table_prefix
            )));
        }
        if self.max_record_size == 0 {
            return Err(DriverError::InvalidConfig(
                "max record size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Row layout of one stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkStats {
    /// Number of chunk rows.
    pub count: u64,
    /// Length of the largest chunk in bytes.
    pub largest: u64,
}

/// A driver storing files as chunked rows in a SQLite database.
///
/// One connection is opened by `start` and shared by all callers behind a
/// mutex. With an in-memory database, `stop` discards the stored data.
///
/// # Example
///
/// ```rust
/// use rowfile_driver::{FileDriver, SqliteConfig, SqliteDriver, WriteMode};
///
/// let driver = SqliteDriver::new(SqliteConfig::new()).unwrap();
/// driver.start().unwrap();
/// driver.write_file("a.data", b"row data", WriteMode::Append).unwrap();
/// assert_eq!(driver.list_files("data").unwrap(), vec!["a.data"]);
/// ```
pub struct SqliteDriver {
    config: SqliteConfig,
    files_table: String,
    chunks_table: String,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("config", &self.config)
            .field("started", &self.conn.lock().is_some())
            .finish()
    }
}

impl SqliteDriver {
    /// Creates a driver. No connection is opened until `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SqliteConfig) -> DriverResult<Self> {
        config.validate()?;
        Ok(Self {
            files_table: format!("{}_files", config.table_prefix),
            chunks_table: format!("{}_chunks", config.table_prefix),
            config,
            conn: Mutex::new(None),
        })
    }

    /// Returns the driver configuration.
    #[must_use]
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Returns the chunk rows stored for `name`, or `None` if no such file
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is not started or the query fails.
    pub fn chunk_stats(&self, name: &str) -> DriverResult<Option<ChunkStats>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            if self.size_of(&tx, name)?.is_none() {
                return Ok(None);
            }
            let (count, largest): (i64, i64) = tx.query_row(
                &format!(
                    "SELECT COUNT(*), COALESCE(MAX(length(data)), 0) FROM {} WHERE filename = ?1",
                    self.chunks_table
                ),
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            tx.commit()?;
            Ok(Some(ChunkStats {
                count: count as u64,
                largest: largest as u64,
            }))
        })
    }

    fn connect(&self) -> DriverResult<Connection> {
        let conn = match &self.config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(self.config.busy_timeout)?;
        Ok(conn)
    }

    fn create_schema(&self, conn: &Connection) -> DriverResult<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {files} (
                 filename TEXT PRIMARY KEY,
                 extension TEXT NOT NULL,
                 size INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS {files}_extension ON {files} (extension);
             CREATE TABLE IF NOT EXISTS {chunks} (
                 filename TEXT NOT NULL,
                 pos INTEGER NOT NULL,
                 data BLOB NOT NULL,
                 PRIMARY KEY (filename, pos)
             );",
            files = self.files_table,
            chunks = self.chunks_table,
        ))?;
        Ok(())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> DriverResult<T>) -> DriverResult<T> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(DriverError::NotStarted)?;
        f(conn)
    }

    fn size_of(&self, tx: &Transaction<'_>, name: &str) -> DriverResult<Option<u64>> {
        let size: Option<i64> = tx
            .query_row(
                &format!("SELECT size FROM {} WHERE filename = ?1", self.files_table),
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(size.map(|s| s as u64))
    }

    fn insert_file_row(&self, tx: &Transaction<'_>, name: &str) -> DriverResult<()> {
        tx.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (filename, extension, size) VALUES (?1, ?2, 0)",
                self.files_table
            ),
            params![name, file_extension(name)],
        )?;
        Ok(())
    }

    fn delete_rows(&self, tx: &Transaction<'_>, name: &str) -> DriverResult<()> {
        tx.execute(
            &format!("DELETE FROM {} WHERE filename = ?1", self.chunks_table),
            params![name],
        )?;
        tx.execute(
            &format!("DELETE FROM {} WHERE filename = ?1", self.files_table),
            params![name],
        )?;
        Ok(())
    }

    /// Appends `data` starting at byte `size`, topping up the last chunk
    /// before inserting new ones.
    fn append_chunks(&self, tx: &Transaction<'_>, name: &str, size: u64, mut data: &[u8]) -> DriverResult<()> {
        let max = self.config.max_record_size;
        let mut pos = size;

        let last: Option<(i64, Vec<u8>)> = tx
            .query_row(
                &format!(
                    "SELECT pos, data FROM {} WHERE filename = ?1 ORDER BY pos DESC LIMIT 1",
                    self.chunks_table
                ),
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((last_pos, mut chunk)) = last {
            let room = max.saturating_sub(chunk.len()).min(data.len());
            if room > 0 {
                chunk.extend_from_slice(&data[..room]);
                tx.execute(
                    &format!(
                        "UPDATE {} SET data = ?3 WHERE filename = ?1 AND pos = ?2",
                        self.chunks_table
                    ),
                    params![name, last_pos, chunk],
                )?;
                data = &data[room..];
                pos += room as u64;
            }
        }

        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} (filename, pos, data) VALUES (?1, ?2, ?3)",
            self.chunks_table
        ))?;
        for chunk in data.chunks(max) {
            insert.execute(params![name, pos as i64, chunk])?;
            pos += chunk.len() as u64;
        }
        Ok(())
    }
}

impl FileDriver for SqliteDriver {
    fn start(&self) -> DriverResult<()> {
        let mut guard = self.conn.lock();
        if guard.is_some() {
            return Ok(());
        }
        let conn = self.connect()?;
        self.create_schema(&conn)?;
        debug!(prefix = %self.config.table_prefix, "sqlite driver started");
        *guard = Some(conn);
        Ok(())
    }

    fn stop(&self) -> DriverResult<()> {
        if let Some(conn) = self.conn.lock().take() {
            conn.close().map_err(|(_, e)| DriverError::Sqlite(e))?;
            debug!(prefix = %self.config.table_prefix, "sqlite driver stopped");
        }
        Ok(())
    }

    fn destroy(&self) -> DriverResult<()> {
        let sql = format!(
            "DROP TABLE IF EXISTS {}; DROP TABLE IF EXISTS {};",
            self.chunks_table, self.files_table
        );
        let mut guard = self.conn.lock();
        match guard.as_mut() {
            Some(conn) => conn.execute_batch(&sql)?,
            None => self.connect()?.execute_batch(&sql)?,
        }
        debug!(prefix = %self.config.table_prefix, "sqlite storage destroyed");
        Ok(())
    }

    fn max_record_size(&self) -> usize {
        self.config.max_record_size
    }

    fn list_files(&self, extension: &str) -> DriverResult<Vec<String>> {
        let extension = normalize_extension(extension);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT filename FROM {} WHERE extension = ?1 ORDER BY filename",
                self.files_table
            ))?;
            let names = stmt
                .query_map(params![extension], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    fn open_file(&self, name: &str) -> DriverResult<u64> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            self.insert_file_row(&tx, name)?;
            let size = self.size_of(&tx, name)?.unwrap_or(0);
            tx.commit()?;
            Ok(size)
        })
    }

    fn file_size(&self, name: &str) -> DriverResult<Option<u64>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let size = self.size_of(&tx, name)?;
            tx.commit()?;
            Ok(size)
        })
    }

    fn write_file(&self, name: &str, data: &[u8], mode: WriteMode) -> DriverResult<u64> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            self.insert_file_row(&tx, name)?;
            let mut size = self.size_of(&tx, name)?.unwrap_or(0);

            if mode == WriteMode::Overwrite {
                tx.execute(
                    &format!("DELETE FROM {} WHERE filename = ?1", self.chunks_table),
                    params![name],
                )?;
                size = 0;
            }

            self.append_chunks(&tx, name, size, data)?;
            let new_size = size + data.len() as u64;
            tx.execute(
                &format!("UPDATE {} SET size = ?2 WHERE filename = ?1", self.files_table),
                params![name, new_size as i64],
            )?;
            tx.commit()?;
            Ok(new_size)
        })
    }

    fn read_file(&self, name: &str, offset: u64, buf: &mut [u8]) -> DriverResult<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let size = self
                .size_of(&tx, name)?
                .ok_or_else(|| DriverError::file_not_found(name))?;
            if offset > size {
                return Err(DriverError::ReadPastEnd {
                    name: name.to_string(),
                    offset,
                    size,
                });
            }

            let end = offset.saturating_add(buf.len() as u64).min(size);
            let mut read = 0usize;
            {
                let mut stmt = tx.prepare(&format!(
                    "SELECT pos, data FROM {} \
                     WHERE filename = ?1 AND pos + length(data) > ?2 AND pos < ?3 \
                     ORDER BY pos",
                    self.chunks_table
                ))?;
                let rows = stmt.query_map(params![name, offset as i64, end as i64], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
                })?;
                for row in rows {
                    let (pos, chunk) = row?;
                    let pos = pos as u64;
                    let want = offset + read as u64;
                    if pos > want {
                        return Err(DriverError::Corrupted(format!(
                            "gap in chunks of {name} at offset {want}"
                        )));
                    }
                    let from = (want - pos) as usize;
                    let n = chunk.len().saturating_sub(from).min(buf.len() - read);
                    buf[read..read + n].copy_from_slice(&chunk[from..from + n]);
                    read += n;
                }
            }
            tx.commit()?;
            Ok(read)
        })
    }

    fn delete_file(&self, name: &str) -> DriverResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            self.delete_rows(&tx, name)?;
            tx.commit()?;
            Ok(())
        })
    }

    fn rename_file(&self, from: &str, to: &str) -> DriverResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            if self.size_of(&tx, to)?.is_some() {
                return Err(DriverError::file_exists(to));
            }
            if self.size_of(&tx, from)?.is_none() {
                return Err(DriverError::file_not_found(from));
            }
            tx.execute(
                &format!(
                    "UPDATE {} SET filename = ?2, extension = ?3 WHERE filename = ?1",
                    self.files_table
                ),
                params![from, to, file_extension(to)],
            )?;
            tx.execute(
                &format!("UPDATE {} SET filename = ?2 WHERE filename = ?1", self.chunks_table),
                params![from, to],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    fn copy_file(&self, from: &str, to: &str) -> DriverResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            if self.size_of(&tx, from)?.is_none() {
                return Err(DriverError::file_not_found(from));
            }
            if from != to {
                self.delete_rows(&tx, to)?;
                tx.execute(
                    &format!(
                        "INSERT INTO {files} (filename, extension, size) \
                         SELECT ?2, ?3, size FROM {files} WHERE filename = ?1",
                        files = self.files_table
                    ),
                    params![from, to, file_extension(to)],
                )?;
                tx.execute(
                    &format!(
                        "INSERT INTO {chunks} (filename, pos, data) \
                         SELECT ?2, pos, data FROM {chunks} WHERE filename = ?1",
                        chunks = self.chunks_table
                    ),
                    params![from, to],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn started(max: usize) -> SqliteDriver {
        let driver = SqliteDriver::new(SqliteConfig::new().max_record_size(max)).unwrap();
        driver.start().unwrap();
        driver
    }

    fn contents(driver: &SqliteDriver, name: &str) -> Vec<u8> {
        let size = driver.file_size(name).unwrap().unwrap();
        let mut buf = vec![0u8; size as usize];
        let n = driver.read_file(name, 0, &mut buf).unwrap();
        assert_eq!(n, buf.len());
        buf
    }

    #[test]
    fn sqlite_rejects_bad_prefix() {
        let result = SqliteDriver::new(SqliteConfig::new().table_prefix("drop table; --"));
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));

        let result = SqliteDriver::new(SqliteConfig::new().table_prefix("1abc"));
        assert!(matches!(result, Err(DriverError::InvalidConfig(_))));
    }

    #[test]
    fn sqlite_requires_start() {
        let driver = SqliteDriver::new(SqliteConfig::new()).unwrap();
        assert!(matches!(driver.open_file("a"), Err(DriverError::NotStarted)));
    }

    #[test]
    fn sqlite_append_across_chunks() {
        let driver = started(4);
        assert_eq!(driver.write_file("a.data", b"abcdef", WriteMode::Append).unwrap(), 6);
        assert_eq!(driver.write_file("a.data", b"ghijk", WriteMode::Append).unwrap(), 11);
        assert_eq!(contents(&driver, "a.data"), b"abcdefghijk");

        let mut buf = [0u8; 5];
        assert_eq!(driver.read_file("a.data", 3, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"defgh");
    }

    #[test]
    fn sqlite_overwrite_replaces_content() {
        let driver = started(4);
        driver.write_file("a", b"abcdefghij", WriteMode::Append).unwrap();
        assert_eq!(driver.write_file("a", b"xy", WriteMode::Overwrite).unwrap(), 2);
        assert_eq!(contents(&driver, "a"), b"xy");
    }

    #[test]
    fn sqlite_read_past_end_fails() {
        let driver = started(4);
        driver.write_file("a", b"abc", WriteMode::Append).unwrap();
        let mut buf = [0u8; 2];
        let result = driver.read_file("a", 4, &mut buf);
        assert!(matches!(result, Err(DriverError::ReadPastEnd { .. })));
        assert_eq!(driver.read_file("a", 3, &mut buf).unwrap(), 0);
    }

    #[test]
    fn sqlite_list_by_extension() {
        let driver = started(16);
        for name in ["b.data", "a.data", "c.journal"] {
            driver.open_file(name).unwrap();
        }
        assert_eq!(driver.list_files("data").unwrap(), vec!["a.data", "b.data"]);
        assert!(driver.list_files("page").unwrap().is_empty());
    }

    #[test]
    fn sqlite_list_after_destroy_fails() {
        let driver = started(16);
        driver.destroy().unwrap();
        assert!(driver.list_files("data").is_err());
    }

    #[test]
    fn sqlite_rename_and_copy() {
        let driver = started(4);
        driver.write_file("a.data", b"abcdefg", WriteMode::Append).unwrap();

        driver.copy_file("a.data", "b.data").unwrap();
        assert_eq!(contents(&driver, "b.data"), b"abcdefg");

        assert!(matches!(
            driver.rename_file("a.data", "b.data"),
            Err(DriverError::FileExists { .. })
        ));

        driver.rename_file("a.data", "c.journal").unwrap();
        assert_eq!(driver.file_size("a.data").unwrap(), None);
        assert_eq!(driver.list_files("journal").unwrap(), vec!["c.journal"]);
        assert_eq!(contents(&driver, "c.journal"), b"abcdefg");
    }

    #[test]
    fn sqlite_delete_removes_rows() {
        let driver = started(4);
        driver.write_file("a", b"abcdefg", WriteMode::Append).unwrap();
        driver.delete_file("a").unwrap();
        assert_eq!(driver.file_size("a").unwrap(), None);
    }

    #[test]
    fn sqlite_chunk_stats_reflect_rows() {
        let driver = started(4);
        assert_eq!(driver.chunk_stats("a").unwrap(), None);

        driver.open_file("a").unwrap();
        assert_eq!(driver.chunk_stats("a").unwrap(), Some(ChunkStats::default()));

        driver.write_file("a", b"abcdefghij", WriteMode::Append).unwrap();
        assert_eq!(
            driver.chunk_stats("a").unwrap(),
            Some(ChunkStats { count: 3, largest: 4 })
        );
    }

    #[test]
    fn sqlite_persists_across_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let config = SqliteConfig::new().path(&path).max_record_size(8);

        {
            let driver = SqliteDriver::new(config.clone()).unwrap();
            driver.start().unwrap();
            driver.write_file("j.journal", b"persistent rows", WriteMode::Append).unwrap();
            driver.stop().unwrap();
        }

        let driver = SqliteDriver::new(config).unwrap();
        driver.start().unwrap();
        assert_eq!(contents(&driver, "j.journal"), b"persistent rows");
    }
}
