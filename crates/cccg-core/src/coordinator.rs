//! Save coordinator
//!
//! Orchestrates save/load/delete across the device and cloud stores with a
//! fixed precedence:
//!
//! - load: local first; the cloud only when the local copy is missing or
//!   unreadable. A cloud hit is returned as-is and not written back.
//! - save: full record locally, sanitized record to the cloud, then the
//!   last-save pointer once the cloud leg has resolved.
//!
//! Local wins on load. There is no merge and no conflict detection, and two
//! concurrent saves of the same key are not serialized: the last one to
//! complete wins remotely.
//!
//! A character protected by a PIN must be unlocked through [`PinLock`]
//! before it can be loaded, saved, renamed or deleted.

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::adapter::PersistenceAdapter;
use crate::cloud::CloudStore;
use crate::error::{PersistError, PersistResult};
use crate::events::{CacheReport, VaultEvent};
use crate::last_save;
use crate::pin::PinLock;
use crate::types::{KeyRole, Record, SaveKey};

/// Outcome of a save that reached at least one store
#[derive(Debug)]
pub struct SaveReport {
    /// The key that was saved
    pub key: SaveKey,
    /// Local write succeeded
    pub local: bool,
    /// Cloud write succeeded
    pub cloud: bool,
    /// Why the local write failed, if it did
    pub local_error: Option<PersistError>,
    /// Why the cloud write failed, if it did
    pub cloud_error: Option<PersistError>,
    /// The last-save pointer now names this key
    pub pointer_updated: bool,
}

impl SaveReport {
    /// Both legs succeeded
    pub fn is_complete(&self) -> bool {
        self.local && self.cloud
    }
}

/// Coordinates the two stores on behalf of the session and the scheduler
pub struct SaveCoordinator<C> {
    adapter: PersistenceAdapter<C>,
    pins: PinLock,
    event_tx: broadcast::Sender<VaultEvent>,
}

impl<C> Clone for SaveCoordinator<C> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
            pins: self.pins.clone(),
            event_tx: self.event_tx.clone(),
        }
    }
}

impl<C: CloudStore> SaveCoordinator<C> {
    pub fn new(adapter: PersistenceAdapter<C>, event_tx: broadcast::Sender<VaultEvent>) -> Self {
        let pins = PinLock::new(adapter.local_handle());
        Self {
            adapter,
            pins,
            event_tx,
        }
    }

    /// PBKDF2 iterations for newly set character PINs
    pub fn with_pin_iterations(mut self, iterations: u32) -> Self {
        self.pins = self.pins.with_iterations(iterations);
        self
    }

    /// The underlying adapter
    pub fn adapter(&self) -> &PersistenceAdapter<C> {
        &self.adapter
    }

    /// Character PIN locks
    pub fn pins(&self) -> &PinLock {
        &self.pins
    }

    /// Subscribe to vault events
    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: VaultEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Load
    // ═══════════════════════════════════════════════════════════════════════

    /// Load a character sheet by display name.
    pub async fn load_player_character(&self, name: &str) -> PersistResult<Record> {
        let key = SaveKey::player(name)?;
        self.load_character_by_key(&key).await
    }

    /// Load any record: local first, cloud on any local failure.
    ///
    /// Returns `NotFound` when neither store has it. A cloud transport or
    /// HTTP failure is propagated as-is so "offline" and "no such record"
    /// stay distinguishable. A locked character is `Unauthorized`.
    pub async fn load_character_by_key(&self, key: &SaveKey) -> PersistResult<Record> {
        self.pins.check(key)?;
        match self.adapter.load_local(key) {
            Ok(record) => {
                debug!(%key, "Loaded from local store");
                return Ok(record);
            }
            Err(e) if e.is_not_found() => debug!(%key, "No local copy, trying cloud"),
            Err(e) => warn!(%key, error = %e, "Local load failed, trying cloud"),
        }

        match self.adapter.load_cloud(key).await {
            Ok(record) => {
                debug!(%key, "Loaded from cloud");
                Ok(record)
            }
            Err(e) if e.is_not_found() => Err(PersistError::NotFound(key.as_string())),
            Err(e) => {
                warn!(%key, error = %e, "Cloud load failed");
                Err(e)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Save
    // ═══════════════════════════════════════════════════════════════════════

    /// Save to both stores.
    ///
    /// `Ok` when at least one leg succeeded (the report says which);
    /// `Err` with the cloud error when both failed.
    pub async fn save_character(&self, key: &SaveKey, record: &Record) -> PersistResult<SaveReport> {
        self.pins.check(key)?;
        let local_error = self.adapter.save_local(key, record).err();
        if let Some(e) = &local_error {
            warn!(%key, error = %e, "Local save failed");
        }

        let cloud_error = self.adapter.put_cloud(key, record).await.err();
        if let Some(e) = &cloud_error {
            warn!(%key, error = %e, "Cloud save failed");
        }

        let local = local_error.is_none();
        let cloud = cloud_error.is_none();
        if !local && !cloud {
            return Err(cloud_error.unwrap_or_else(|| {
                PersistError::Storage(format!("save of {} failed on both stores", key))
            }));
        }

        let pointer_updated = last_save::write_best_effort(self.adapter.local(), key);
        info!(%key, local, cloud, "Saved character");
        self.emit(VaultEvent::CharacterSaved {
            key: key.clone(),
            local,
            cloud,
        });

        Ok(SaveReport {
            key: key.clone(),
            local,
            cloud,
            local_error,
            cloud_error,
            pointer_updated,
        })
    }

    /// Save, then append a best-effort cloud autosave history entry.
    pub async fn save_autosave(&self, key: &SaveKey, record: &Record) -> PersistResult<SaveReport> {
        let report = self.save_character(key, record).await?;
        if report.cloud {
            if let Err(e) = self.adapter.save_cloud_autosave(key, record).await {
                warn!(%key, error = %e, "Cloud autosave history entry failed");
            }
        }
        Ok(report)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Delete / rename / list
    // ═══════════════════════════════════════════════════════════════════════

    /// Delete a character locally and, best effort, in the cloud.
    ///
    /// The director's character cannot be deleted. Its PIN goes with it.
    pub async fn delete_character(&self, key: &SaveKey) -> PersistResult<()> {
        if key.is_director_character() {
            return Err(PersistError::InvalidOperation(format!(
                "{} cannot be deleted",
                key.display_name()
            )));
        }
        self.pins.check(key)?;

        self.adapter.delete_save(key)?;
        if let Err(e) = self.pins.forget(key) {
            warn!(%key, error = %e, "Failed to remove PIN of deleted character");
        }
        if let Err(e) = self.adapter.delete_cloud(key).await {
            warn!(%key, error = %e, "Cloud delete failed; local copy removed");
        }

        info!(%key, "Deleted character");
        self.emit(VaultEvent::CharacterDeleted { key: key.clone() });
        Ok(())
    }

    /// Move a record to a new key.
    ///
    /// The new key is saved first; the old one is only removed once that
    /// save has succeeded, and its PIN moves to the new key. Renaming onto
    /// the same key is a plain save.
    pub async fn rename_character(
        &self,
        from: &SaveKey,
        to: &SaveKey,
        record: &Record,
    ) -> PersistResult<SaveReport> {
        if from == to {
            return self.save_character(to, record).await;
        }
        if from.is_director_character() {
            return Err(PersistError::InvalidOperation(format!(
                "{} cannot be renamed",
                from.display_name()
            )));
        }
        self.pins.check(from)?;

        let report = self.save_character(to, record).await?;
        if let Err(e) = self.pins.move_pin(from, to) {
            warn!(%from, %to, error = %e, "Failed to move PIN after rename");
        }

        if let Err(e) = self.adapter.delete_save(from) {
            warn!(key = %from, error = %e, "Failed to remove old local save after rename");
        }
        if let Err(e) = self.adapter.delete_cloud(from).await {
            warn!(key = %from, error = %e, "Failed to remove old cloud save after rename");
        }

        info!(%from, %to, "Renamed character");
        self.emit(VaultEvent::CharacterRenamed {
            from: from.clone(),
            to: to.clone(),
        });
        Ok(report)
    }

    /// Sorted union of local and cloud keys for a role.
    ///
    /// When the cloud cannot be listed the local keys are returned alone.
    pub async fn list_characters(&self, role: KeyRole) -> PersistResult<Vec<SaveKey>> {
        let mut keys = self.adapter.list_local_saves(role)?;
        match self.adapter.list_cloud_saves(role).await {
            Ok(cloud_keys) => keys.extend(cloud_keys),
            Err(e) => warn!(%role, error = %e, "Cloud listing failed, showing local saves only"),
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// The key the last-save pointer names, if any
    pub fn last_saved_key(&self) -> PersistResult<Option<SaveKey>> {
        last_save::read(self.adapter.local())
    }

    /// Mirror cloud saves locally and announce the result.
    pub async fn cache_cloud_saves(&self) -> PersistResult<CacheReport> {
        let report = self.adapter.cache_cloud_saves().await?;
        self.emit(VaultEvent::CacheRefreshed {
            cached: report.cached.len(),
            skipped: report.skipped.len(),
            failed: report.failed.len(),
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{CloudCall, CloudPath, MemoryCloud, SimulatedFailure};
    use crate::events::event_channel;
    use crate::storage::{LocalStore, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn create_test_coordinator() -> (SaveCoordinator<MemoryCloud>, Arc<MemoryStore>, Arc<MemoryCloud>) {
        let local = Arc::new(MemoryStore::new());
        let cloud = Arc::new(MemoryCloud::new());
        let adapter = PersistenceAdapter::new(local.clone(), cloud.clone());
        (SaveCoordinator::new(adapter, event_channel()), local, cloud)
    }

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_local_hit_skips_cloud() {
        let (coordinator, _, cloud) = create_test_coordinator();
        let key = SaveKey::player("Eve").unwrap();
        coordinator.adapter().save_local(&key, &record(json!({ "hp": 1 }))).unwrap();

        let loaded = coordinator.load_player_character("Eve").await.unwrap();
        assert_eq!(loaded, record(json!({ "hp": 1 })));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cloud_fallback_is_not_written_back() {
        let (coordinator, local, cloud) = create_test_coordinator();
        let key = SaveKey::player("Eve").unwrap();
        cloud.insert(&CloudPath::save(&key), json!({ "hp": 30 }));

        let loaded = coordinator.load_character_by_key(&key).await.unwrap();
        assert_eq!(loaded, record(json!({ "hp": 30 })));
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn test_missing_everywhere_is_not_found() {
        let (coordinator, _, _) = create_test_coordinator();
        let err = coordinator.load_player_character("Nobody").await.unwrap_err();
        assert!(matches!(err, PersistError::NotFound(k) if k == "player:Nobody"));
    }

    #[tokio::test]
    async fn test_offline_load_propagates_transport_error() {
        let (coordinator, _, cloud) = create_test_coordinator();
        cloud.set_failure(Some(SimulatedFailure::Offline));
        let err = coordinator.load_player_character("Eve").await.unwrap_err();
        assert!(matches!(err, PersistError::NetworkUnreachable(_)));
    }

    #[tokio::test]
    async fn test_save_writes_both_legs_and_pointer() {
        let (coordinator, local, cloud) = create_test_coordinator();
        let mut events = coordinator.subscribe();
        let key = SaveKey::player("Eve").unwrap();
        let rec = record(json!({ "hp": 30, "ui": { "scroll": 1 } }));

        let report = coordinator.save_character(&key, &rec).await.unwrap();
        assert!(report.is_complete());
        assert!(report.pointer_updated);

        assert_eq!(coordinator.adapter().load_local(&key).unwrap(), rec);
        assert_eq!(cloud.document(&CloudPath::save(&key)), Some(json!({ "hp": 30 })));
        assert_eq!(local.get_item("last-save").unwrap().as_deref(), Some("player:Eve"));
        assert_eq!(coordinator.last_saved_key().unwrap(), Some(key.clone()));

        assert_eq!(
            events.recv().await.unwrap(),
            VaultEvent::CharacterSaved { key, local: true, cloud: true }
        );
    }

    #[tokio::test]
    async fn test_save_offline_is_partial_success() {
        let (coordinator, _, cloud) = create_test_coordinator();
        cloud.set_failure(Some(SimulatedFailure::Offline));
        let key = SaveKey::player("Eve").unwrap();

        let report = coordinator.save_character(&key, &record(json!({}))).await.unwrap();
        assert!(report.local);
        assert!(!report.cloud);
        assert!(matches!(report.cloud_error, Some(PersistError::NetworkUnreachable(_))));
    }

    #[tokio::test]
    async fn test_save_fails_when_both_legs_fail() {
        let local = Arc::new(MemoryStore::with_quota(0));
        let cloud = Arc::new(MemoryCloud::new());
        cloud.set_failure(Some(SimulatedFailure::Status(503, "Service Unavailable".into())));
        let coordinator =
            SaveCoordinator::new(PersistenceAdapter::new(local, cloud), event_channel());

        let key = SaveKey::player("Eve").unwrap();
        let err = coordinator.save_character(&key, &record(json!({}))).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
    }

    #[tokio::test]
    async fn test_delete_refuses_director() {
        let (coordinator, _, _) = create_test_coordinator();
        let key = SaveKey::player("The DM").unwrap();
        assert!(matches!(
            coordinator.delete_character(&key).await.unwrap_err(),
            PersistError::InvalidOperation(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_survives_cloud_failure() {
        let (coordinator, local, cloud) = create_test_coordinator();
        let key = SaveKey::player("Eve").unwrap();
        coordinator.save_character(&key, &record(json!({}))).await.unwrap();

        cloud.set_failure(Some(SimulatedFailure::Offline));
        coordinator.delete_character(&key).await.unwrap();
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn test_rename_moves_record() {
        let (coordinator, _, cloud) = create_test_coordinator();
        let old = SaveKey::player("Bruce").unwrap();
        let new = SaveKey::player("Batman").unwrap();
        let rec = record(json!({ "hp": 9 }));
        coordinator.save_character(&old, &rec).await.unwrap();

        coordinator.rename_character(&old, &new, &rec).await.unwrap();

        assert!(coordinator.adapter().load_local(&old).is_err());
        assert_eq!(coordinator.adapter().load_local(&new).unwrap(), rec);
        assert_eq!(cloud.document(&CloudPath::save(&old)), None);
        assert_eq!(coordinator.last_saved_key().unwrap(), Some(new));
    }

    #[tokio::test]
    async fn test_list_characters_unions_stores() {
        let (coordinator, _, cloud) = create_test_coordinator();
        let local_only = SaveKey::player("Local").unwrap();
        let cloud_only = SaveKey::player("Cloud").unwrap();
        coordinator.adapter().save_local(&local_only, &record(json!({}))).unwrap();
        cloud.insert(&CloudPath::save(&cloud_only), json!({}));

        let keys = coordinator.list_characters(KeyRole::Player).await.unwrap();
        assert_eq!(keys, vec![cloud_only, local_only.clone()]);

        cloud.set_failure(Some(SimulatedFailure::Offline));
        let keys = coordinator.list_characters(KeyRole::Player).await.unwrap();
        assert_eq!(keys, vec![local_only]);
    }

    #[tokio::test]
    async fn test_pin_guards_load_save_and_delete() {
        let (coordinator, _, _) = create_test_coordinator();
        let coordinator = coordinator.with_pin_iterations(10);
        let key = SaveKey::player("Nova").unwrap();
        coordinator.save_character(&key, &record(json!({ "hp": 4 }))).await.unwrap();
        coordinator.pins().set_pin(&key, "2468").unwrap();
        coordinator.pins().lock_all();

        for err in [
            coordinator.load_character_by_key(&key).await.unwrap_err(),
            coordinator.save_character(&key, &record(json!({}))).await.unwrap_err(),
            coordinator.delete_character(&key).await.unwrap_err(),
        ] {
            assert!(matches!(err, PersistError::Unauthorized(_)), "{err}");
        }
        assert!(coordinator.adapter().load_local(&key).is_ok());

        assert!(coordinator.pins().unlock(&key, "1111").is_err());
        coordinator.pins().unlock(&key, "2468").unwrap();
        assert_eq!(
            coordinator.load_character_by_key(&key).await.unwrap(),
            record(json!({ "hp": 4 }))
        );

        coordinator.delete_character(&key).await.unwrap();
        assert!(!coordinator.pins().has_pin(&key).unwrap());
    }

    #[tokio::test]
    async fn test_rename_carries_pin() {
        let (coordinator, local, _) = create_test_coordinator();
        let coordinator = coordinator.with_pin_iterations(10);
        let old = SaveKey::player("Bruce").unwrap();
        let new = SaveKey::player("Batman").unwrap();
        let rec = record(json!({ "hp": 9 }));
        coordinator.save_character(&old, &rec).await.unwrap();
        coordinator.pins().set_pin(&old, "cave").unwrap();
        coordinator.pins().lock_all();

        assert!(matches!(
            coordinator.rename_character(&old, &new, &rec).await,
            Err(PersistError::Unauthorized(_))
        ));
        assert!(coordinator.adapter().load_local(&new).is_err());

        coordinator.pins().unlock(&old, "cave").unwrap();
        coordinator.rename_character(&old, &new, &rec).await.unwrap();
        assert!(local.get_item("pin:Bruce").unwrap().is_none());
        assert!(coordinator.pins().verify_pin(&new, "cave").unwrap());

        coordinator.pins().lock_all();
        assert!(coordinator.load_character_by_key(&new).await.is_err());
    }

    #[tokio::test]
    async fn test_save_autosave_appends_history() {
        let (coordinator, _, cloud) = create_test_coordinator();
        let key = SaveKey::player("Hero").unwrap();
        coordinator.save_autosave(&key, &record(json!({ "hp": 2 }))).await.unwrap();

        let puts: Vec<_> = cloud
            .calls()
            .into_iter()
            .filter(|c| matches!(c, CloudCall::Put(_)))
            .collect();
        assert_eq!(puts.len(), 2);
        assert!(puts[1].path().starts_with("autosaves/player:Hero/"));
    }
}
