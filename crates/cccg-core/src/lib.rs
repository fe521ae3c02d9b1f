//! Catalyst Core Character Vault
//!
//! Local-first save/load for a tabletop companion app, with a best-effort
//! cloud copy in a Realtime-Database-style JSON tree.
//!
//! ## Overview
//!
//! Every character sheet, player profile and director record is a JSON
//! object stored under a role-prefixed key (`player:Nova`, `user:Eve`).
//! Saves go to the device first and to the cloud second; loads try the
//! device first and fall back to the cloud.
//!
//! ## Core Principles
//!
//! - **Local-first**: The app works fully offline; the cloud is a backup
//! - **Sanitized uploads**: Per-device `ui` state never leaves the device
//! - **Device-held PINs**: A character can be locked with a PIN that is
//!   stored on the device only
//! - **Quiet background work**: Autosave and cache refresh run as tasks and
//!   report through [`VaultEvent`]s
//!
//! ## Quick Start
//!
//! ```ignore
//! use cccg_core::{CharacterVault, SaveKey, Record, VaultConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let vault = CharacterVault::open("~/.cccg/data", VaultConfig::default()).await?;
//!
//!     let key = SaveKey::player("Nova")?;
//!     let record = Record::from_json(r#"{ "hp": 12 }"#)?;
//!     vault.save_character(&key, &record).await?;
//!
//!     for key in vault.list_characters(cccg_core::KeyRole::Player).await? {
//!         println!("{}", key.display_name());
//!     }
//!
//!     vault.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod autosave;
pub mod cloud;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod events;
pub mod last_save;
pub mod pin;
pub mod refresh;
pub mod sanitize;
pub mod session;
pub mod storage;
pub mod types;

// Re-exports
pub use adapter::{should_pull_cloud_copy, PersistenceAdapter};
pub use autosave::{AutosaveConfig, AutosaveScheduler, AutosaveSlot};
pub use cloud::{
    AnyCloud, CloudCall, CloudPath, CloudStore, HttpCloud, MemoryCloud, OfflineCloud,
    SimulatedFailure,
};
pub use config::VaultConfig;
pub use coordinator::{SaveCoordinator, SaveReport};
pub use credentials::{Credential, Digest, UserProfile};
pub use engine::{CharacterVault, VaultInfo};
pub use error::{PersistError, PersistResult};
pub use events::{CacheReport, VaultEvent};
pub use pin::PinLock;
pub use refresh::{CacheRefresher, CacheTrigger};
pub use sanitize::sanitize_for_cloud;
pub use session::{Session, SessionManager, SessionRole};
pub use storage::{LocalStore, MemoryStore, Storage};
pub use types::*;
