//! Per-character PIN locks
//!
//! A character sheet can carry a PIN. The PIN is hashed into a
//! [`Credential`] and kept on the device at `pin:<name>`; it never goes to
//! the cloud. While a character has a PIN it has to be unlocked before it
//! can be loaded, saved, renamed or deleted. Unlocks last until
//! [`PinLock::lock_all`] (the vault calls it when a session ends).

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::credentials::{Credential, DEFAULT_ITERATIONS};
use crate::error::{PersistError, PersistResult};
use crate::storage::LocalStore;
use crate::types::{KeyRole, SaveKey};

/// Local key prefix of stored PIN artifacts
pub const PIN_PREFIX: &str = "pin:";

/// PIN artifacts plus the set of characters unlocked this session.
///
/// Clones share the unlocked set. Profiles (`user:` keys) are never locked.
#[derive(Clone)]
pub struct PinLock {
    local: Arc<dyn LocalStore>,
    iterations: u32,
    unlocked: Arc<RwLock<HashSet<SaveKey>>>,
}

impl PinLock {
    pub fn new(local: Arc<dyn LocalStore>) -> Self {
        Self {
            local,
            iterations: DEFAULT_ITERATIONS,
            unlocked: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// PBKDF2 iterations for newly set PINs
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    fn storage_key(key: &SaveKey) -> String {
        format!("{}{}", PIN_PREFIX, key.name())
    }

    fn stored(&self, key: &SaveKey) -> PersistResult<Option<String>> {
        if key.role() != KeyRole::Player {
            return Ok(None);
        }
        self.local.get_item(&Self::storage_key(key))
    }

    /// Protect `key` with `pin`, replacing any PIN it had.
    ///
    /// Replacing an existing PIN requires the character to be unlocked.
    /// The character stays unlocked afterwards.
    pub fn set_pin(&self, key: &SaveKey, pin: &str) -> PersistResult<()> {
        if key.role() != KeyRole::Player {
            return Err(PersistError::InvalidOperation(format!(
                "{} is not a character sheet",
                key
            )));
        }
        if pin.trim().is_empty() {
            return Err(PersistError::InvalidOperation("PIN cannot be empty".to_string()));
        }
        self.check(key)?;

        let credential = Credential::generate(pin, self.iterations)?;
        self.local
            .set_item(&Self::storage_key(key), &serde_json::to_string(&credential)?)?;
        self.unlocked.write().insert(key.clone());
        info!(%key, "PIN set");
        Ok(())
    }

    /// True when `key` carries a PIN
    pub fn has_pin(&self, key: &SaveKey) -> PersistResult<bool> {
        Ok(self.stored(key)?.is_some())
    }

    /// True when `pin` matches the stored PIN. A character without a PIN
    /// never verifies; neither does an unreadable artifact.
    pub fn verify_pin(&self, key: &SaveKey, pin: &str) -> PersistResult<bool> {
        let Some(raw) = self.stored(key)? else {
            return Ok(false);
        };
        match serde_json::from_str::<Credential>(&raw) {
            Ok(credential) => Ok(credential.verify(pin)),
            Err(e) => {
                warn!(%key, error = %e, "Unreadable PIN artifact");
                Ok(false)
            }
        }
    }

    /// Unlock `key` for this session. A character without a PIN needs no
    /// unlocking and always succeeds.
    pub fn unlock(&self, key: &SaveKey, pin: &str) -> PersistResult<()> {
        if !self.has_pin(key)? {
            return Ok(());
        }
        if !self.verify_pin(key, pin)? {
            warn!(%key, "Wrong PIN");
            return Err(PersistError::Unauthorized(format!(
                "invalid PIN for {}",
                key.display_name()
            )));
        }
        self.unlocked.write().insert(key.clone());
        debug!(%key, "Unlocked");
        Ok(())
    }

    /// True when `key` may be used right now
    pub fn is_unlocked(&self, key: &SaveKey) -> PersistResult<bool> {
        Ok(!self.has_pin(key)? || self.unlocked.read().contains(key))
    }

    /// `Unauthorized` unless `key` is unprotected or unlocked
    pub fn check(&self, key: &SaveKey) -> PersistResult<()> {
        if self.is_unlocked(key)? {
            Ok(())
        } else {
            Err(PersistError::Unauthorized(format!(
                "{} is locked by a PIN",
                key.display_name()
            )))
        }
    }

    /// Carry the PIN (and unlock state) of `from` over to `to`.
    ///
    /// Nothing happens when `from` has no PIN.
    pub fn move_pin(&self, from: &SaveKey, to: &SaveKey) -> PersistResult<()> {
        let Some(raw) = self.stored(from)? else {
            return Ok(());
        };
        if to.role() != KeyRole::Player {
            return Ok(());
        }
        self.local.set_item(&Self::storage_key(to), &raw)?;
        self.local.remove_item(&Self::storage_key(from))?;

        let mut unlocked = self.unlocked.write();
        if unlocked.remove(from) {
            unlocked.insert(to.clone());
        }
        debug!(%from, %to, "PIN moved");
        Ok(())
    }

    /// Remove the PIN of `key`. The character must be unlocked.
    pub fn clear_pin(&self, key: &SaveKey) -> PersistResult<()> {
        self.check(key)?;
        self.forget(key)
    }

    /// Remove the PIN without checking it (the character is going away)
    pub(crate) fn forget(&self, key: &SaveKey) -> PersistResult<()> {
        if key.role() == KeyRole::Player {
            self.local.remove_item(&Self::storage_key(key))?;
        }
        self.unlocked.write().remove(key);
        Ok(())
    }

    /// Lock every character again
    pub fn lock_all(&self) {
        self.unlocked.write().clear();
    }
}
