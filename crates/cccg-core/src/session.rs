//! Session and identity
//!
//! ```text
//! Anonymous ──login──▶ (authenticating) ──ok──▶ Authenticated(role)
//!     ▲                        │                       │
//!     └────────── failed ──────┘◀────── logout ────────┘
//! ```
//!
//! The session lives only in memory. Logging out deletes nothing.

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::cloud::CloudStore;
use crate::coordinator::SaveCoordinator;
use crate::credentials::{Credential, UserProfile, DEFAULT_ITERATIONS};
use crate::error::{PersistError, PersistResult};
use crate::storage::LocalStore;
use crate::types::{KeyRole, SaveKey, DIRECTOR_CHARACTER_NAME};

/// Who is logged in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Director,
    Player,
}

/// The active login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Character key the session edits
    pub key: SaveKey,
    /// Name shown to people
    pub display_name: String,
    pub role: SessionRole,
}

impl Session {
    fn director() -> PersistResult<Self> {
        Ok(Self {
            key: SaveKey::player(DIRECTOR_CHARACTER_NAME)?,
            display_name: DIRECTOR_CHARACTER_NAME.to_string(),
            role: SessionRole::Director,
        })
    }

    fn player(key: SaveKey) -> Self {
        Self {
            display_name: key.display_name(),
            key,
            role: SessionRole::Player,
        }
    }
}

/// Tracks the single active session and mediates authentication
pub struct SessionManager<C> {
    coordinator: SaveCoordinator<C>,
    session: RwLock<Option<Session>>,
    dm_credential: Option<Credential>,
    password_iterations: u32,
}

impl<C: CloudStore> SessionManager<C> {
    pub fn new(coordinator: SaveCoordinator<C>, dm_credential: Option<Credential>) -> Self {
        Self {
            coordinator,
            session: RwLock::new(None),
            dm_credential,
            password_iterations: DEFAULT_ITERATIONS,
        }
    }

    /// PBKDF2 iterations used when hashing new player passwords
    pub fn with_password_iterations(mut self, iterations: u32) -> Self {
        self.password_iterations = iterations;
        self
    }

    /// Create a player profile.
    ///
    /// The credential record goes to `user:<name>` through the coordinator;
    /// no character sheet is created. Returns the profile's character key.
    pub async fn register_player(&self, name: &str, password: &str) -> PersistResult<SaveKey> {
        let user_key = SaveKey::user(name)?;
        if password.is_empty() {
            return Err(PersistError::InvalidOperation(
                "password must not be empty".to_string(),
            ));
        }
        if self
            .coordinator
            .adapter()
            .local()
            .get_item(&user_key.as_string())?
            .is_some()
        {
            return Err(PersistError::AlreadyExists(user_key.as_string()));
        }

        let profile = UserProfile::register(password, self.password_iterations)?;
        let report = self
            .coordinator
            .save_character(&user_key, &profile.to_record()?)
            .await?;
        info!(key = %user_key, cloud = report.cloud, "Registered player");

        Ok(user_key.with_role(KeyRole::Player))
    }

    /// Check a director PIN; on success the director session becomes active.
    ///
    /// `false` when no credential is configured or the PIN does not match.
    pub fn login_dm(&self, pin: &str) -> bool {
        let Some(credential) = &self.dm_credential else {
            warn!("Director login attempted with no credential configured");
            return false;
        };
        if !credential.verify(pin) {
            debug!("Director PIN rejected");
            return false;
        }

        match Session::director() {
            Ok(session) => {
                *self.session.write() = Some(session);
                info!("Director logged in");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to build director session");
                false
            }
        }
    }

    /// Verify a player's password and make them the active session.
    ///
    /// Unknown names and wrong passwords are both `Unauthorized`; a cloud
    /// failure while looking the profile up is propagated.
    pub async fn login_player(&self, name: &str, password: &str) -> PersistResult<Session> {
        let user_key = SaveKey::user(name)?;
        let record = match self.coordinator.load_character_by_key(&user_key).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                return Err(PersistError::Unauthorized(format!(
                    "no player named {}",
                    user_key.display_name()
                )))
            }
            Err(e) => return Err(e),
        };

        let profile = UserProfile::from_record(&record).map_err(|e| {
            warn!(key = %user_key, error = %e, "Unreadable profile record");
            PersistError::Unauthorized(format!("profile for {} is unreadable", name))
        })?;
        if !profile.verify_password(password) {
            return Err(PersistError::Unauthorized("invalid password".to_string()));
        }

        let session = Session::player(user_key.with_role(KeyRole::Player));
        *self.session.write() = Some(session.clone());
        info!(key = %session.key, "Player logged in");
        Ok(session)
    }

    /// End the session. Stored data is untouched.
    pub fn logout(&self) {
        if let Some(session) = self.session.write().take() {
            info!(key = %session.key, "Logged out");
        }
    }

    /// Display name of the logged-in player; `None` for the director or
    /// when nobody is logged in.
    pub fn current_player(&self) -> Option<String> {
        self.session
            .read()
            .as_ref()
            .filter(|s| s.role == SessionRole::Player)
            .map(|s| s.display_name.clone())
    }

    /// True while the director is logged in
    pub fn is_dm(&self) -> bool {
        matches!(
            self.session.read().as_ref(),
            Some(Session {
                role: SessionRole::Director,
                ..
            })
        )
    }

    /// Snapshot of the active session
    pub fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    /// Key of the active session's character
    pub fn active_key(&self) -> Option<SaveKey> {
        self.session.read().as_ref().map(|s| s.key.clone())
    }
}
