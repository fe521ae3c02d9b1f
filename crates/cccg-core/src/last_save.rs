//! The `last-save` pointer
//!
//! A single local key naming the most recently saved record, used to
//! pre-select it on the next start. Every write here is best effort: the
//! pointer annotates a save, it never decides whether the save succeeded.

use tracing::{debug, warn};

use crate::error::PersistResult;
use crate::storage::LocalStore;
use crate::types::SaveKey;

/// Local key holding the pointer
pub const LAST_SAVE_KEY: &str = "last-save";

/// Read the pointer.
///
/// Older clients stored a bare character name ("Eve", "The DM"); such a value
/// is read as a `player:` key and rewritten in key form. Unreadable values
/// read as `None`.
pub fn read(store: &dyn LocalStore) -> PersistResult<Option<SaveKey>> {
    let raw = match store.get_item(LAST_SAVE_KEY)? {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(None),
    };

    if let Ok(key) = SaveKey::parse(raw.trim()) {
        return Ok(Some(key));
    }

    match SaveKey::player(&raw) {
        Ok(key) => {
            debug!(legacy = %raw, %key, "Migrating legacy last-save pointer");
            if let Err(e) = store.set_item(LAST_SAVE_KEY, &key.as_string()) {
                warn!(error = %e, "Failed to rewrite legacy last-save pointer");
            }
            Ok(Some(key))
        }
        Err(_) => Ok(None),
    }
}

/// Point at `key`, logging and swallowing any failure.
///
/// Returns whether the pointer was written.
pub fn write_best_effort(store: &dyn LocalStore, key: &SaveKey) -> bool {
    match store.set_item(LAST_SAVE_KEY, &key.as_string()) {
        Ok(()) => true,
        Err(e) => {
            warn!(%key, error = %e, "Failed to update last-save pointer");
            false
        }
    }
}

/// Remove the pointer if it names `key` (legacy bare names included).
pub fn clear_if_points_to(store: &dyn LocalStore, key: &SaveKey) {
    let current = match read(store) {
        Ok(current) => current,
        Err(e) => {
            warn!(%key, error = %e, "Failed to read last-save pointer");
            return;
        }
    };
    if current.as_ref() == Some(key) {
        if let Err(e) = store.remove_item(LAST_SAVE_KEY) {
            warn!(%key, error = %e, "Failed to clear last-save pointer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_write_and_read() {
        let store = MemoryStore::new();
        let key = SaveKey::player("Eve").unwrap();
        assert!(write_best_effort(&store, &key));
        assert_eq!(read(&store).unwrap(), Some(key));
    }

    #[test]
    fn test_missing_pointer_reads_none() {
        let store = MemoryStore::new();
        assert_eq!(read(&store).unwrap(), None);
        store.set_item(LAST_SAVE_KEY, "   ").unwrap();
        assert_eq!(read(&store).unwrap(), None);
    }

    #[test]
    fn test_legacy_bare_name_is_migrated() {
        let store = MemoryStore::new();
        store.set_item(LAST_SAVE_KEY, "The DM").unwrap();

        let key = read(&store).unwrap().unwrap();
        assert_eq!(key.as_string(), "player:DM");
        assert_eq!(
            store.get_item(LAST_SAVE_KEY).unwrap().as_deref(),
            Some("player:DM")
        );
    }

    #[test]
    fn test_quota_failure_is_swallowed() {
        let store = MemoryStore::with_quota(0);
        let key = SaveKey::player("Eve").unwrap();
        assert!(!write_best_effort(&store, &key));
    }

    #[test]
    fn test_clear_only_matching_pointer() {
        let store = MemoryStore::new();
        let eve = SaveKey::player("Eve").unwrap();
        let nova = SaveKey::player("Nova").unwrap();
        write_best_effort(&store, &eve);

        clear_if_points_to(&store, &nova);
        assert_eq!(read(&store).unwrap(), Some(eve.clone()));

        clear_if_points_to(&store, &eve);
        assert_eq!(read(&store).unwrap(), None);
    }
}
