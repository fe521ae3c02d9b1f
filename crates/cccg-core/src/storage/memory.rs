//! In-memory [`LocalStore`] for tests and sessions that should leave nothing
//! on disk.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{check_quota, LocalStore};
use crate::error::PersistError;

/// Map-backed local store with an optional byte quota
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<BTreeMap<String, String>>,
    quota_bytes: Option<u64>,
}

impl MemoryStore {
    /// Create an empty, unlimited store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that refuses writes beyond `quota_bytes`
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl LocalStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let mut items = self.items.write();
        let current: u64 = items
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum();
        check_quota(self.quota_bytes, current, key, value)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), PersistError> {
        self.items.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, PersistError> {
        Ok(self.items.read().keys().cloned().collect())
    }
}
