//! CharacterVault - the primary entry point
//!
//! CharacterVault wires the local store, the cloud store, the save
//! coordinator, the session manager and the two background tasks (autosave
//! and cache refresh) into one handle.
//!
//! # Example
//!
//! ```ignore
//! use cccg_core::{CharacterVault, VaultConfig};
//!
//! let vault = CharacterVault::open("~/.cccg/data", VaultConfig::default()).await?;
//!
//! vault.register_player("Eve", "hunter2").await?;
//! vault.login_player("Eve", "hunter2").await?;
//!
//! let record = vault.load_active_character().await?;
//! vault.mark_dirty(record);
//!
//! vault.shutdown().await;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::adapter::PersistenceAdapter;
use crate::autosave::{self, ActiveKeySource, AutosaveScheduler};
use crate::cloud::{AnyCloud, CloudStore};
use crate::config::{VaultConfig, DATABASE_FILE};
use crate::coordinator::{SaveCoordinator, SaveReport};
use crate::error::{PersistError, PersistResult};
use crate::events::{event_channel, CacheReport, VaultEvent};
use crate::refresh::{CacheRefresher, CacheTrigger};
use crate::session::{Session, SessionManager};
use crate::storage::{LocalStore, Storage};
use crate::types::{KeyRole, Record, SaveKey};

/// Summary shown by `cccg info`
#[derive(Debug, Clone)]
pub struct VaultInfo {
    /// Directory where data is stored (`None` for in-memory vaults)
    pub data_dir: Option<PathBuf>,
    /// Cloud backend in use
    pub cloud: &'static str,
    /// Character sheets stored on this device
    pub local_characters: usize,
    /// Profiles stored on this device
    pub local_profiles: usize,
    /// Key the last-save pointer names
    pub last_save: Option<SaveKey>,
    /// Whether a director credential is configured
    pub dm_configured: bool,
}

/// Main entry point for the character vault
pub struct CharacterVault<C = AnyCloud> {
    coordinator: SaveCoordinator<C>,
    sessions: Arc<SessionManager<C>>,
    autosave: AutosaveScheduler,
    refresher: CacheRefresher,
    data_dir: Option<PathBuf>,
    config: VaultConfig,
}

impl CharacterVault<AnyCloud> {
    /// Open (or create) a vault in `data_dir`.
    ///
    /// This will:
    /// - Create the data directory if it doesn't exist
    /// - Open the redb store with the configured quota
    /// - Pick the cloud backend from the config (offline when no URL)
    /// - Start the autosave and cache-refresh tasks
    pub async fn open(data_dir: impl AsRef<Path>, config: VaultConfig) -> PersistResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        info!(?data_dir, "Opening character vault");

        std::fs::create_dir_all(&data_dir)?;
        let storage = Storage::new(data_dir.join(DATABASE_FILE))?.with_quota(config.quota_bytes);
        let cloud = config.cloud()?;
        info!(cloud = cloud.kind(), "Cloud backend selected");

        let mut vault = Self::with_stores(Arc::new(storage), Arc::new(cloud), config);
        vault.data_dir = Some(data_dir);
        Ok(vault)
    }

    /// Name of the cloud backend in use
    pub fn cloud_kind(&self) -> &'static str {
        self.coordinator.adapter().cloud().kind()
    }

    /// Summary of the vault's state
    pub fn info(&self) -> PersistResult<VaultInfo> {
        let adapter = self.coordinator.adapter();
        Ok(VaultInfo {
            data_dir: self.data_dir.clone(),
            cloud: self.cloud_kind(),
            local_characters: adapter.list_local_saves(KeyRole::Player)?.len(),
            local_profiles: adapter.list_local_saves(KeyRole::User)?.len(),
            last_save: self.coordinator.last_saved_key()?,
            dm_configured: self.config.dm_credential.is_some(),
        })
    }
}

impl<C: CloudStore + 'static> CharacterVault<C> {
    /// Build a vault over explicit stores. Must be called inside a tokio
    /// runtime; the background tasks are spawned here.
    pub fn with_stores(local: Arc<dyn LocalStore>, cloud: Arc<C>, config: VaultConfig) -> Self {
        let coordinator = SaveCoordinator::new(PersistenceAdapter::new(local, cloud), event_channel())
            .with_pin_iterations(config.password_iterations);
        let sessions = Arc::new(
            SessionManager::new(coordinator.clone(), config.dm_credential.clone())
                .with_password_iterations(config.password_iterations),
        );

        let session_ref = Arc::clone(&sessions);
        let active_key: ActiveKeySource = Arc::new(move || session_ref.active_key());
        let autosave = AutosaveScheduler::spawn(coordinator.clone(), active_key, config.autosave());
        let refresher = CacheRefresher::spawn(coordinator.clone());

        Self {
            coordinator,
            sessions,
            autosave,
            refresher,
            data_dir: None,
            config,
        }
    }

    /// Data directory, when backed by disk
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// The configuration the vault was opened with
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The save coordinator
    pub fn coordinator(&self) -> &SaveCoordinator<C> {
        &self.coordinator
    }

    /// Subscribe to vault events
    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.coordinator.subscribe()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Characters
    // ═══════════════════════════════════════════════════════════════════════

    /// Load a character sheet by display name (local, then cloud)
    pub async fn load_player_character(&self, name: &str) -> PersistResult<Record> {
        self.coordinator.load_player_character(name).await
    }

    /// Load any record by key (local, then cloud)
    pub async fn load_character_by_key(&self, key: &SaveKey) -> PersistResult<Record> {
        self.coordinator.load_character_by_key(key).await
    }

    /// Save a record to both stores
    pub async fn save_character(&self, key: &SaveKey, record: &Record) -> PersistResult<SaveReport> {
        self.coordinator.save_character(key, record).await
    }

    /// Delete a character (never the director's)
    pub async fn delete_character(&self, key: &SaveKey) -> PersistResult<()> {
        self.coordinator.delete_character(key).await
    }

    /// Move a record to a new key
    pub async fn rename_character(
        &self,
        from: &SaveKey,
        to: &SaveKey,
        record: &Record,
    ) -> PersistResult<SaveReport> {
        self.coordinator.rename_character(from, to, record).await
    }

    /// Sorted union of local and cloud keys
    pub async fn list_characters(&self, role: KeyRole) -> PersistResult<Vec<SaveKey>> {
        self.coordinator.list_characters(role).await
    }

    /// Key the last-save pointer names
    pub fn last_saved_key(&self) -> PersistResult<Option<SaveKey>> {
        self.coordinator.last_saved_key()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Session
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a player profile
    pub async fn register_player(&self, name: &str, password: &str) -> PersistResult<SaveKey> {
        self.sessions.register_player(name, password).await
    }

    /// Director login. On success the previous session is closed out.
    pub async fn login_dm(&self, pin: &str) -> bool {
        let ok = self.sessions.login_dm(pin);
        if ok {
            self.close_out_session().await;
        }
        ok
    }

    /// Player login. On success the previous session is closed out.
    pub async fn login_player(&self, name: &str, password: &str) -> PersistResult<Session> {
        let session = self.sessions.login_player(name, password).await?;
        self.close_out_session().await;
        Ok(session)
    }

    /// End the session, saving pending autosave work under its owner first
    pub async fn logout(&self) {
        self.close_out_session().await;
        self.sessions.logout()
    }

    /// Pending autosave work goes out under the character it belongs to;
    /// unlocked PINs lock again.
    async fn close_out_session(&self) {
        if !self.autosave.end_session().await {
            warn!("Unsaved autosave snapshot dropped at session change");
        }
        self.coordinator.pins().lock_all();
    }

    /// Logged-in player's display name
    pub fn current_player(&self) -> Option<String> {
        self.sessions.current_player()
    }

    /// True while the director is logged in
    pub fn is_dm(&self) -> bool {
        self.sessions.is_dm()
    }

    /// Snapshot of the active session
    pub fn session(&self) -> Option<Session> {
        self.sessions.session()
    }

    fn require_active_key(&self) -> PersistResult<SaveKey> {
        self.sessions
            .active_key()
            .ok_or_else(|| PersistError::InvalidOperation("nobody is logged in".to_string()))
    }

    /// Record to start editing the session's character from.
    ///
    /// Local save, else the session's own autosave, else a blank record.
    /// The result becomes the autosave baseline.
    pub fn initial_record(&self) -> PersistResult<Record> {
        let key = self.require_active_key()?;
        self.coordinator.pins().check(&key)?;
        let record = autosave::initial_record(self.coordinator.adapter(), &key);
        self.autosave.mark_synced(record.clone());
        Ok(record)
    }

    /// Load the session's character (local, then cloud) and adopt it as the
    /// autosave baseline.
    pub async fn load_active_character(&self) -> PersistResult<Record> {
        let key = self.require_active_key()?;
        let record = self.coordinator.load_character_by_key(&key).await?;
        self.autosave.mark_synced(record.clone());
        Ok(record)
    }

    /// Explicit save of the session's character
    pub async fn save_active_character(&self, record: &Record) -> PersistResult<SaveReport> {
        let key = self.require_active_key()?;
        let report = self.coordinator.save_character(&key, record).await?;
        self.autosave.mark_synced(record.clone());
        Ok(report)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PINs
    // ═══════════════════════════════════════════════════════════════════════

    /// Protect a character with a PIN (replacing one needs it unlocked)
    pub fn set_character_pin(&self, key: &SaveKey, pin: &str) -> PersistResult<()> {
        self.coordinator.pins().set_pin(key, pin)
    }

    /// True when the character carries a PIN
    pub fn has_character_pin(&self, key: &SaveKey) -> PersistResult<bool> {
        self.coordinator.pins().has_pin(key)
    }

    /// Unlock a character until the session ends
    pub fn unlock_character(&self, key: &SaveKey, pin: &str) -> PersistResult<()> {
        self.coordinator.pins().unlock(key, pin)
    }

    /// Remove a character's PIN; it must be unlocked
    pub fn clear_character_pin(&self, key: &SaveKey) -> PersistResult<()> {
        self.coordinator.pins().clear_pin(key)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Autosave
    // ═══════════════════════════════════════════════════════════════════════

    /// Signal that the editing session changed
    pub fn mark_dirty(&self, record: Record) {
        self.autosave.mark_dirty(record)
    }

    /// Adopt `record` as the synced baseline
    pub fn mark_synced(&self, record: Record) {
        self.autosave.mark_synced(record)
    }

    /// Save any pending snapshot now; `true` when clean afterwards
    pub async fn flush_autosave(&self) -> bool {
        self.autosave.flush().await
    }

    /// Sanitized autosave history entry; returns its timestamp
    pub async fn save_cloud_autosave(&self, key: &SaveKey, record: &Record) -> PersistResult<i64> {
        self.coordinator.adapter().save_cloud_autosave(key, record).await
    }

    /// Autosave timestamps, newest first
    pub async fn list_cloud_backups(&self, key: &SaveKey) -> PersistResult<Vec<i64>> {
        self.coordinator.adapter().list_cloud_backups(key).await
    }

    /// One autosave history entry
    pub async fn load_cloud_backup(&self, key: &SaveKey, ts: i64) -> PersistResult<Record> {
        self.coordinator.adapter().load_cloud_backup(key, ts).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Cache refresh
    // ═══════════════════════════════════════════════════════════════════════

    /// Mirror cloud saves into local storage now
    pub async fn cache_cloud_saves(&self) -> PersistResult<CacheReport> {
        self.coordinator.cache_cloud_saves().await
    }

    /// Ask the background refresher to run
    pub fn trigger_cache_refresh(&self, trigger: CacheTrigger) {
        self.refresher.trigger(trigger)
    }

    /// Route a posted worker message; `true` when it was a refresh request
    pub fn handle_worker_message(&self, message: &str) -> bool {
        self.refresher.handle_message(message)
    }

    /// Flush pending autosave work and stop the background tasks
    pub async fn shutdown(self) {
        info!("Shutting down character vault");
        if !self.autosave.flush().await {
            warn!("Unsaved autosave snapshot dropped at shutdown");
        }
        self.autosave.shutdown().await;
        self.refresher.shutdown().await;
    }
}
