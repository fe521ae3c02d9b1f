//! Error types for the character vault

use thiserror::Error;

/// Main error type for vault operations
///
/// Local-store and cloud-store failures are both folded into this enum so the
/// coordinator can decide, per variant, whether to fall back to the other
/// store or to surface the failure to the caller.
#[derive(Error, Debug)]
pub enum PersistError {
    /// No record exists at this key (or the stored value was unreadable)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote store could not be reached at all
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The remote store answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body text, as sent by the server
        body: String,
    },

    /// The remote store answered 2xx but the body was not valid JSON
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The local store refused a write because it would exceed its quota
    #[error("Quota exceeded writing {key}: {needed} bytes needed, quota is {quota}")]
    QuotaExceeded {
        /// Key being written
        key: String,
        /// Total bytes the store would hold after the write
        needed: u64,
        /// Configured quota in bytes
        quota: u64,
    },

    /// A profile with this key is already registered
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Credentials were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Save key could not be parsed or built
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid operation for current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(String),

    /// Error during local storage operations (redb)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PersistError {
    /// True for "nothing stored here", the one failure the coordinator
    /// recovers from by asking the other store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistError::NotFound(_))
    }

    /// True for failures of the remote transport (as opposed to absence).
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            PersistError::NetworkUnreachable(_)
                | PersistError::Http { .. }
                | PersistError::MalformedResponse(_)
        )
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        PersistError::Serialization(err.to_string())
    }
}

/// Result type alias using PersistError
pub type PersistResult<T> = Result<T, PersistError>;
