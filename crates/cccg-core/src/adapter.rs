//! Key-value persistence adapter
//!
//! Uniform get/set/delete over the device store and the cloud store. This
//! layer owns serialization and failure typing; it does not decide which
//! store wins. That is the coordinator's job.
//!
//! ```text
//! local:  player:<name> / user:<name>  -> JSON text (full record, ui kept)
//! cloud:  saves/<key>                  -> sanitized record
//!         autosaves/<key>/<ts>         -> sanitized record
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cloud::{CloudPath, CloudStore};
use crate::error::{PersistError, PersistResult};
use crate::events::CacheReport;
use crate::last_save;
use crate::storage::LocalStore;
use crate::types::{now_ms, KeyRole, Record, SaveKey};

/// Inner fields an older client wrapped records in
const LEGACY_ENVELOPE_FIELDS: [&str; 3] = ["data", "character", "sheet"];

/// Freshness rule for cache refresh: take the cloud copy only when it is
/// strictly newer than a readable local copy.
pub fn should_pull_cloud_copy(local: Option<&Record>, cloud: &Record) -> bool {
    match local {
        None => true,
        Some(local) => cloud.updated_at() > local.updated_at(),
    }
}

/// Unwrap `{ updatedAt, data | character | sheet }` written by older clients.
fn unwrap_legacy_envelope(value: Value) -> Value {
    if let Value::Object(map) = &value {
        if map.contains_key("updatedAt") {
            for field in LEGACY_ENVELOPE_FIELDS {
                if let Some(inner @ Value::Object(_)) = map.get(field) {
                    return inner.clone();
                }
            }
        }
    }
    value
}

fn record_from_remote(key: &SaveKey, value: Value) -> PersistResult<Record> {
    Record::from_value(unwrap_legacy_envelope(value)).map_err(|e| {
        PersistError::MalformedResponse(format!("cloud copy of {} is not a record: {}", key, e))
    })
}

/// Adapter over one local store and one cloud store
pub struct PersistenceAdapter<C> {
    local: Arc<dyn LocalStore>,
    cloud: Arc<C>,
}

impl<C> Clone for PersistenceAdapter<C> {
    fn clone(&self) -> Self {
        Self {
            local: Arc::clone(&self.local),
            cloud: Arc::clone(&self.cloud),
        }
    }
}

impl<C: CloudStore> PersistenceAdapter<C> {
    pub fn new(local: Arc<dyn LocalStore>, cloud: Arc<C>) -> Self {
        Self { local, cloud }
    }

    /// The device store
    pub fn local(&self) -> &dyn LocalStore {
        self.local.as_ref()
    }

    /// Shared handle to the device store
    pub fn local_handle(&self) -> Arc<dyn LocalStore> {
        Arc::clone(&self.local)
    }

    /// The cloud store
    pub fn cloud(&self) -> &C {
        &self.cloud
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Local
    // ═══════════════════════════════════════════════════════════════════════

    /// Write the full record (including `ui`) to the device store.
    pub fn save_local(&self, key: &SaveKey, record: &Record) -> PersistResult<()> {
        let json = record.to_json()?;
        self.local.set_item(&key.as_string(), &json)?;
        debug!(%key, bytes = json.len(), "Saved locally");
        Ok(())
    }

    /// Read a record from the device store.
    ///
    /// A corrupt value is treated as absent.
    pub fn load_local(&self, key: &SaveKey) -> PersistResult<Record> {
        let raw = self
            .local
            .get_item(&key.as_string())?
            .ok_or_else(|| PersistError::NotFound(key.as_string()))?;

        Record::from_json(&raw).map_err(|e| {
            warn!(%key, error = %e, "Ignoring unreadable local save");
            PersistError::NotFound(key.as_string())
        })
    }

    /// Remove the local copy and clear the last-save pointer if it names `key`.
    pub fn delete_save(&self, key: &SaveKey) -> PersistResult<()> {
        self.local.remove_item(&key.as_string())?;
        last_save::clear_if_points_to(self.local.as_ref(), key);
        debug!(%key, "Deleted local save");
        Ok(())
    }

    /// Keys stored locally under a role prefix, sorted.
    pub fn list_local_saves(&self, role: KeyRole) -> PersistResult<Vec<SaveKey>> {
        let mut keys: Vec<SaveKey> = self
            .local
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(role.prefix()))
            .filter_map(|k| SaveKey::parse(&k).ok())
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Cloud
    // ═══════════════════════════════════════════════════════════════════════

    /// Sanitize and write to `saves/<key>` without touching the pointer.
    pub(crate) async fn put_cloud(&self, key: &SaveKey, record: &Record) -> PersistResult<()> {
        let body = record.sanitized_for_cloud().into_value();
        self.cloud.put(&CloudPath::save(key), &body).await?;
        debug!(%key, "Saved to cloud");
        Ok(())
    }

    /// Sanitize and write to `saves/<key>`, then point `last-save` at it.
    ///
    /// A pointer failure is logged and does not fail the save.
    pub async fn save_cloud(&self, key: &SaveKey, record: &Record) -> PersistResult<()> {
        self.put_cloud(key, record).await?;
        last_save::write_best_effort(self.local.as_ref(), key);
        Ok(())
    }

    /// Fetch `saves/<key>`; `NotFound` when the cloud has nothing there.
    pub async fn load_cloud(&self, key: &SaveKey) -> PersistResult<Record> {
        let value = self
            .cloud
            .get(&CloudPath::save(key))
            .await?
            .ok_or_else(|| PersistError::NotFound(key.as_string()))?;
        record_from_remote(key, value)
    }

    /// Remove `saves/<key>`. Autosave history is left in place.
    pub async fn delete_cloud(&self, key: &SaveKey) -> PersistResult<()> {
        self.cloud.delete(&CloudPath::save(key)).await?;
        debug!(%key, "Deleted cloud save");
        Ok(())
    }

    /// Keys stored in the cloud under a role prefix, sorted.
    pub async fn list_cloud_saves(&self, role: KeyRole) -> PersistResult<Vec<SaveKey>> {
        let mut keys: Vec<SaveKey> = self
            .cloud
            .list_children(&CloudPath::saves())
            .await?
            .into_iter()
            .filter(|k| k.starts_with(role.prefix()))
            .filter_map(|k| SaveKey::parse(&k).ok())
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Mirror every cloud save into the device store.
    ///
    /// Fails only when the cloud listing itself fails; per-key failures are
    /// collected in the report.
    pub async fn cache_cloud_saves(&self) -> PersistResult<CacheReport> {
        let names = self.cloud.list_children(&CloudPath::saves()).await?;
        let mut report = CacheReport::default();

        for name in names {
            let key = match SaveKey::parse(&name) {
                Ok(key) => key,
                Err(e) => {
                    report.failed.push((name, e.to_string()));
                    continue;
                }
            };

            let cloud_copy = match self.load_cloud(&key).await {
                Ok(record) => record,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!(%key, error = %e, "Failed to fetch cloud save for caching");
                    report.failed.push((key.as_string(), e.to_string()));
                    continue;
                }
            };

            let local_copy = self.load_local(&key).ok();
            if !should_pull_cloud_copy(local_copy.as_ref(), &cloud_copy) {
                report.skipped.push(key);
                continue;
            }

            match self.save_local(&key, &cloud_copy) {
                Ok(()) => report.cached.push(key),
                Err(e) => {
                    warn!(%key, error = %e, "Failed to cache cloud save locally");
                    report.failed.push((key.as_string(), e.to_string()));
                }
            }
        }

        info!(%report, "Cached cloud saves");
        Ok(report)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Autosave history
    // ═══════════════════════════════════════════════════════════════════════

    /// Sanitize and append an autosave history entry; returns its timestamp.
    pub async fn save_cloud_autosave(&self, key: &SaveKey, record: &Record) -> PersistResult<i64> {
        let ts = now_ms();
        let body = record.sanitized_for_cloud().into_value();
        self.cloud.put(&CloudPath::autosave(key, ts), &body).await?;
        debug!(%key, ts, "Saved cloud autosave");
        Ok(ts)
    }

    /// Autosave timestamps for a key, newest first.
    pub async fn list_cloud_backups(&self, key: &SaveKey) -> PersistResult<Vec<i64>> {
        let mut stamps: Vec<i64> = self
            .cloud
            .list_children(&CloudPath::autosaves(key))
            .await?
            .into_iter()
            .filter_map(|s| s.parse::<i64>().ok())
            .collect();
        stamps.sort_unstable_by(|a, b| b.cmp(a));
        Ok(stamps)
    }

    /// One autosave history entry.
    pub async fn load_cloud_backup(&self, key: &SaveKey, ts: i64) -> PersistResult<Record> {
        let value = self
            .cloud
            .get(&CloudPath::autosave(key, ts))
            .await?
            .ok_or_else(|| PersistError::NotFound(format!("{}@{}", key, ts)))?;
        record_from_remote(key, value)
    }
}
