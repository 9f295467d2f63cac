//! File store configuration.

/// Default longest accepted file name, in bytes.
pub const DEFAULT_MAX_NAME_LEN: usize = 255;

/// Configuration for a [`FileStore`](crate::FileStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether closing an open file syncs it first.
    pub sync_on_close: bool,

    /// Longest accepted file name, in bytes.
    pub max_name_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_on_close: true,
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether closing an open file syncs it first.
    #[must_use]
    pub const fn sync_on_close(mut self, value: bool) -> Self {
        self.sync_on_close = value;
        self
    }

    /// Sets the longest accepted file name.
    #[must_use]
    pub const fn max_name_len(mut self, len: usize) -> Self {
        self.max_name_len = len;
        self
    }
}
