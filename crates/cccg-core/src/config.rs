//! Vault configuration
//!
//! Read from `<data_dir>/config.json` when present; every field is optional.
//! The CLI layers its flags and environment variables on top.
//!
//! ```json
//! {
//!   "cloudUrl": "https://example-default-rtdb.firebaseio.com",
//!   "cloudAuth": null,
//!   "quotaBytes": 5242880,
//!   "dmCredential": { "hash": "...", "salt": "...", "iterations": 120000,
//!                     "keyLength": 32, "digest": "SHA-256" },
//!   "passwordIterations": 120000,
//!   "autosaveDebounceMs": 2000,
//!   "autosaveIntervalMs": 120000
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::autosave::{AutosaveConfig, DEFAULT_DEBOUNCE, DEFAULT_INTERVAL, MAX_PERIOD};
use crate::cloud::{AnyCloud, HttpCloud, OfflineCloud};
use crate::credentials::{Credential, DEFAULT_ITERATIONS};
use crate::error::{PersistError, PersistResult};

/// Config file name inside the data directory
pub const CONFIG_FILE: &str = "config.json";

/// redb file name inside the data directory
pub const DATABASE_FILE: &str = "cccg.redb";

/// Everything the vault needs besides its data directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultConfig {
    /// Realtime Database root; `None` runs offline
    pub cloud_url: Option<String>,
    /// Database auth token appended to every request
    pub cloud_auth: Option<String>,
    /// Local store byte quota
    pub quota_bytes: Option<u64>,
    /// Director PIN artifact
    pub dm_credential: Option<Credential>,
    /// PBKDF2 iterations for new player passwords
    pub password_iterations: u32,
    pub autosave_debounce_ms: u64,
    pub autosave_interval_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            cloud_url: None,
            cloud_auth: None,
            quota_bytes: None,
            dm_credential: None,
            password_iterations: DEFAULT_ITERATIONS,
            autosave_debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            autosave_interval_ms: DEFAULT_INTERVAL.as_millis() as u64,
        }
    }
}

impl VaultConfig {
    /// Path of the config file for a data directory
    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join(CONFIG_FILE)
    }

    /// Load `<data_dir>/config.json`, or defaults when it does not exist.
    pub fn load(data_dir: &Path) -> PersistResult<Self> {
        let path = Self::path_in(data_dir);
        if !path.exists() {
            debug!(?path, "No config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| PersistError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        debug!(?path, "Loaded config");
        Ok(config)
    }

    /// Write the config back to `<data_dir>/config.json`.
    pub fn save(&self, data_dir: &Path) -> PersistResult<()> {
        std::fs::create_dir_all(data_dir)?;
        let path = Self::path_in(data_dir);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        info!(?path, "Saved config");
        Ok(())
    }

    fn validate(&self) -> PersistResult<()> {
        if self.password_iterations == 0 {
            return Err(PersistError::Config(
                "passwordIterations must be positive".to_string(),
            ));
        }
        if self.autosave_interval_ms == 0 {
            return Err(PersistError::Config(
                "autosaveIntervalMs must be positive".to_string(),
            ));
        }
        let max_ms = MAX_PERIOD.as_millis() as u64;
        for (field, value) in [
            ("autosaveDebounceMs", self.autosave_debounce_ms),
            ("autosaveIntervalMs", self.autosave_interval_ms),
        ] {
            if value > max_ms {
                return Err(PersistError::Config(format!(
                    "{} must be at most {} (one day), got {}",
                    field, max_ms, value
                )));
            }
        }
        Ok(())
    }

    /// Scheduler timing from the millisecond fields
    pub fn autosave(&self) -> AutosaveConfig {
        AutosaveConfig {
            debounce: Duration::from_millis(self.autosave_debounce_ms),
            interval: Duration::from_millis(self.autosave_interval_ms.max(1)),
        }
    }

    /// Build the cloud backend: HTTP when a URL is set, offline otherwise.
    pub fn cloud(&self) -> PersistResult<AnyCloud> {
        match self.cloud_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                let cloud = HttpCloud::new(url)?.with_auth(self.cloud_auth.clone());
                Ok(AnyCloud::Http(cloud))
            }
            _ => Ok(AnyCloud::Offline(OfflineCloud)),
        }
    }
}
