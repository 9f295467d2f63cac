//! Shared helpers for integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use rowfile_core::{CoreError, CriticalErrorListener, FileStore};
use rowfile_driver::FileDriver;
use std::sync::Arc;

/// One critical-error notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub message: String,
    pub file: Option<String>,
    pub error: String,
}

/// Listener that keeps every notification.
#[derive(Debug, Default)]
pub struct RecordingListener {
    reports: Mutex<Vec<Report>>,
}

impl RecordingListener {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.reports.lock().len()
    }
}

impl CriticalErrorListener for RecordingListener {
    fn on_critical_error(&self, error: &CoreError, message: &str, file_name: Option<&str>) {
        self.reports.lock().push(Report {
            message: message.to_string(),
            file: file_name.map(str::to_string),
            error: error.to_string(),
        });
    }
}

/// Builds a store over `driver` with a recording listener.
pub fn store_with<D: FileDriver + 'static>(driver: Arc<D>) -> (FileStore, Arc<RecordingListener>) {
    let listener = Arc::new(RecordingListener::default());
    let store = FileStore::new(driver, listener.clone());
    (store, listener)
}
