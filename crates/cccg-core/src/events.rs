//! Vault events
//!
//! ```text
//! VaultEvent
//! ├── CharacterSaved: a save reached at least one store
//! ├── CharacterDeleted: local copy removed (cloud best effort)
//! ├── CharacterRenamed: record moved to a new key
//! ├── CacheRefreshed: cloud saves mirrored into local storage
//! ├── AutosaveCompleted: the scheduler pushed a snapshot
//! └── AutosaveFailed: the scheduler will retry on the next trigger
//! ```

use std::fmt;

use tokio::sync::broadcast;

use crate::types::SaveKey;

/// Default capacity for the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Summary of a cache refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheReport {
    /// Keys whose cloud copy was written locally
    pub cached: Vec<SaveKey>,
    /// Keys whose local copy was kept
    pub skipped: Vec<SaveKey>,
    /// Keys that could not be fetched or written, with the reason
    pub failed: Vec<(String, String)>,
}

impl CacheReport {
    /// True when every key was handled
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for CacheReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cached, {} kept, {} failed",
            self.cached.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

/// Events emitted by the vault
#[derive(Debug, Clone, PartialEq)]
pub enum VaultEvent {
    /// A save reached at least one store
    CharacterSaved {
        key: SaveKey,
        local: bool,
        cloud: bool,
    },
    /// A character was deleted
    CharacterDeleted { key: SaveKey },
    /// A character moved to a new key
    CharacterRenamed { from: SaveKey, to: SaveKey },
    /// Cloud saves were mirrored into local storage
    CacheRefreshed {
        cached: usize,
        skipped: usize,
        failed: usize,
    },
    /// The autosave scheduler pushed a snapshot
    AutosaveCompleted { key: SaveKey },
    /// An autosave attempt failed; the snapshot stays dirty
    AutosaveFailed {
        key: Option<SaveKey>,
        message: String,
    },
}

impl fmt::Display for VaultEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultEvent::CharacterSaved { key, local, cloud } => {
                write!(f, "saved {} (local: {}, cloud: {})", key, local, cloud)
            }
            VaultEvent::CharacterDeleted { key } => write!(f, "deleted {}", key),
            VaultEvent::CharacterRenamed { from, to } => write!(f, "renamed {} to {}", from, to),
            VaultEvent::CacheRefreshed {
                cached,
                skipped,
                failed,
            } => write!(
                f,
                "cache refreshed ({} cached, {} kept, {} failed)",
                cached, skipped, failed
            ),
            VaultEvent::AutosaveCompleted { key } => write!(f, "autosaved {}", key),
            VaultEvent::AutosaveFailed { key: Some(key), message } => {
                write!(f, "autosave of {} failed: {}", key, message)
            }
            VaultEvent::AutosaveFailed { key: None, message } => {
                write!(f, "autosave failed: {}", message)
            }
        }
    }
}

/// Create the broadcast channel shared by every vault component
pub fn event_channel() -> broadcast::Sender<VaultEvent> {
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    event_tx
}
