//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use cccg_core::{
    CloudPath, CloudStore, LocalStore, MemoryCloud, MemoryStore, PersistError, PersistResult,
};
use parking_lot::Mutex;
use serde_json::Value;

/// One log shared by a [`RecordingStore`] and a [`RecordingCloud`], so the
/// relative order of local and cloud calls is visible.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Local store that logs every call and can refuse writes to chosen keys.
pub struct RecordingStore {
    inner: MemoryStore,
    log: CallLog,
    refused: Mutex<HashSet<String>>,
}

impl RecordingStore {
    pub fn new(log: CallLog) -> Self {
        Self {
            inner: MemoryStore::new(),
            log,
            refused: Mutex::new(HashSet::new()),
        }
    }

    /// Make every write to `key` fail with a quota error.
    pub fn refuse_writes_to(&self, key: &str) {
        self.refused.lock().insert(key.to_string());
    }

    /// Write directly, bypassing the log and refusals.
    pub fn seed(&self, key: &str, value: &str) {
        self.inner.set_item(key, value).unwrap();
    }

    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.get_item(key).ok().flatten()
    }
}

impl LocalStore for RecordingStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistError> {
        self.log.lock().push(format!("local get {}", key));
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistError> {
        self.log.lock().push(format!("local set {}", key));
        if self.refused.lock().contains(key) {
            return Err(PersistError::QuotaExceeded {
                key: key.to_string(),
                needed: value.len() as u64,
                quota: 0,
            });
        }
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), PersistError> {
        self.log.lock().push(format!("local remove {}", key));
        self.inner.remove_item(key)
    }

    fn keys(&self) -> Result<Vec<String>, PersistError> {
        self.inner.keys()
    }
}

/// Cloud store that logs every call before delegating to a [`MemoryCloud`].
pub struct RecordingCloud {
    pub inner: MemoryCloud,
    log: CallLog,
}

impl RecordingCloud {
    pub fn new(log: CallLog) -> Self {
        Self {
            inner: MemoryCloud::new(),
            log,
        }
    }
}

impl CloudStore for RecordingCloud {
    async fn put(&self, path: &CloudPath, body: &Value) -> PersistResult<()> {
        self.log.lock().push(format!("cloud put {}", path));
        self.inner.put(path, body).await
    }

    async fn get(&self, path: &CloudPath) -> PersistResult<Option<Value>> {
        self.log.lock().push(format!("cloud get {}", path));
        self.inner.get(path).await
    }

    async fn delete(&self, path: &CloudPath) -> PersistResult<()> {
        self.log.lock().push(format!("cloud delete {}", path));
        self.inner.delete(path).await
    }

    async fn list_children(&self, path: &CloudPath) -> PersistResult<Vec<String>> {
        self.log.lock().push(format!("cloud list {}", path));
        self.inner.list_children(path).await
    }
}
