//! On-device key-value storage.
//!
//! Everything the vault keeps on the device goes through [`LocalStore`]:
//! character sheets (`player:<name>`), profiles (`user:<name>`), the
//! `last-save` pointer and the `autosave` slot. Values are JSON text.
//!
//! Two implementations:
//! - [`Storage`]: redb-backed, ACID, survives restarts
//! - [`MemoryStore`]: in-process map for tests and throwaway sessions
//!
//! Both accept an optional byte quota (keys + values) and refuse writes that
//! would exceed it with [`PersistError::QuotaExceeded`].

use crate::error::PersistError;
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

mod memory;

pub use memory::MemoryStore;

// Table definitions
const LOCAL_STORE_TABLE: TableDefinition<&str, &str> = TableDefinition::new("local_store");

/// Synchronous string key-value store on the device.
///
/// Implementations must turn every failure into a [`PersistError`]; nothing
/// may panic across this boundary.
pub trait LocalStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key is absent.
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistError>;

    /// Write a value, replacing any previous one.
    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistError>;

    /// Remove a value; absent keys are not an error.
    fn remove_item(&self, key: &str) -> Result<(), PersistError>;

    /// All keys currently stored, in ascending order.
    fn keys(&self) -> Result<Vec<String>, PersistError>;
}

impl<T: LocalStore + ?Sized> LocalStore for Arc<T> {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), PersistError> {
        (**self).remove_item(key)
    }

    fn keys(&self) -> Result<Vec<String>, PersistError> {
        (**self).keys()
    }
}

/// Check a pending write against a quota.
///
/// `current` is the byte total of everything except the entry being replaced.
pub(crate) fn check_quota(
    quota: Option<u64>,
    current: u64,
    key: &str,
    value: &str,
) -> Result<(), PersistError> {
    if let Some(quota) = quota {
        let needed = current + (key.len() + value.len()) as u64;
        if needed > quota {
            return Err(PersistError::QuotaExceeded {
                key: key.to_string(),
                needed,
                quota,
            });
        }
    }
    Ok(())
}

/// Storage layer using redb for ACID-compliant persistence
#[derive(Clone)]
pub struct Storage {
    db: Arc<RwLock<Database>>,
    quota_bytes: Option<u64>,
}

impl Storage {
    /// Create a new storage instance at the given path.
    ///
    /// This will:
    /// - Create the database directory if it doesn't exist
    /// - Initialize the database file
    /// - Create the key-value table
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(LOCAL_STORE_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            quota_bytes: None,
        })
    }

    /// Limit the total bytes (keys + values) the store will hold.
    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Configured quota, if any
    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_bytes
    }

    /// Total bytes held (keys + values)
    pub fn used_bytes(&self) -> Result<u64, PersistError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(LOCAL_STORE_TABLE)?;

        let mut total = 0u64;
        for entry in table.iter()? {
            let (k, v) = entry?;
            total += (k.value().len() + v.value().len()) as u64;
        }
        Ok(total)
    }
}

impl LocalStore for Storage {
    fn get_item(&self, key: &str) -> Result<Option<String>, PersistError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(LOCAL_STORE_TABLE)?;

        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), PersistError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(LOCAL_STORE_TABLE)?;

            if self.quota_bytes.is_some() {
                let mut current = 0u64;
                for entry in table.iter()? {
                    let (k, v) = entry?;
                    if k.value() != key {
                        current += (k.value().len() + v.value().len()) as u64;
                    }
                }
                check_quota(self.quota_bytes, current, key, value)?;
            }

            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), PersistError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(LOCAL_STORE_TABLE)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, PersistError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(LOCAL_STORE_TABLE)?;

        let mut keys = Vec::new();
        for entry in table.iter()? {
            let (k, _) = entry?;
            keys.push(k.value().to_string());
        }
        Ok(keys)
    }
}
