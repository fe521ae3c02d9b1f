//! PBKDF2 credential artifacts
//!
//! The director PIN and player passwords are never stored in clear. What is
//! stored is an artifact of the form
//!
//! ```json
//! { "hash": "<base64>", "salt": "<base64>", "iterations": 120000,
//!   "keyLength": 32, "digest": "SHA-256" }
//! ```
//!
//! produced by [`Credential::generate`] (the CLI's `dm generate-pin` for the
//! director) and checked by [`Credential::verify`].

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use tracing::warn;

use crate::error::{PersistError, PersistResult};
use crate::types::{now_ms, Record};

/// Iterations used when none are configured
pub const DEFAULT_ITERATIONS: u32 = 120_000;

/// Derived key length in bytes
pub const KEY_LENGTH: usize = 32;

/// Salt length in bytes
pub const SALT_LENGTH: usize = 16;

// Larger artifacts are rejected rather than derived
const MAX_KEY_LENGTH: usize = 512;

/// HMAC digest of the derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Digest {
    #[default]
    #[serde(rename = "SHA-256", alias = "sha256")]
    Sha256,
    #[serde(rename = "SHA-512", alias = "sha512")]
    Sha512,
}

/// A salted PBKDF2 hash of a secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Derived key, base64
    pub hash: String,
    /// Salt, base64
    pub salt: String,
    pub iterations: u32,
    #[serde(default = "default_key_length")]
    pub key_length: usize,
    #[serde(default)]
    pub digest: Digest,
}

fn default_key_length() -> usize {
    KEY_LENGTH
}

fn derive(secret: &str, salt: &[u8], iterations: u32, digest: Digest, key_length: usize) -> Vec<u8> {
    let mut key = vec![0u8; key_length];
    match digest {
        Digest::Sha256 => pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, iterations, &mut key),
        Digest::Sha512 => pbkdf2_hmac::<Sha512>(secret.as_bytes(), salt, iterations, &mut key),
    }
    key
}

/// Compare without short-circuiting on the first differing byte
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl Credential {
    /// Hash `secret` with a fresh random salt (SHA-256, 32-byte key).
    pub fn generate(secret: &str, iterations: u32) -> PersistResult<Self> {
        if iterations == 0 {
            return Err(PersistError::InvalidOperation(
                "iterations must be a positive integer".to_string(),
            ));
        }

        let mut salt = [0u8; SALT_LENGTH];
        rand::rng().fill_bytes(&mut salt);
        let hash = derive(secret, &salt, iterations, Digest::Sha256, KEY_LENGTH);

        Ok(Self {
            hash: B64.encode(hash),
            salt: B64.encode(salt),
            iterations,
            key_length: KEY_LENGTH,
            digest: Digest::Sha256,
        })
    }

    /// True when `secret` derives to the stored hash.
    ///
    /// A malformed artifact never verifies.
    pub fn verify(&self, secret: &str) -> bool {
        if self.iterations == 0 || self.key_length == 0 || self.key_length > MAX_KEY_LENGTH {
            warn!(iterations = self.iterations, key_length = self.key_length, "Rejecting malformed credential");
            return false;
        }
        let (salt, expected) = match (B64.decode(&self.salt), B64.decode(&self.hash)) {
            (Ok(salt), Ok(hash)) => (salt, hash),
            _ => {
                warn!("Rejecting credential with invalid base64");
                return false;
            }
        };
        let derived = derive(secret, &salt, self.iterations, self.digest, self.key_length);
        constant_time_eq(&derived, &expected)
    }

    /// Pretty JSON, as printed by the generator
    pub fn to_pretty_json(&self) -> PersistResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Record stored at `user:<name>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
    /// Plaintext password written by older clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub registered_at: i64,
}

impl UserProfile {
    /// New profile for a password, hashed with `iterations`
    pub fn register(password: &str, iterations: u32) -> PersistResult<Self> {
        Ok(Self {
            credential: Some(Credential::generate(password, iterations)?),
            password: None,
            registered_at: now_ms(),
        })
    }

    /// Read a profile out of a stored record
    pub fn from_record(record: &Record) -> PersistResult<Self> {
        Ok(serde_json::from_value(record.clone().into_value())?)
    }

    /// Convert to a storable record
    pub fn to_record(&self) -> PersistResult<Record> {
        Record::from_value(serde_json::to_value(self)?)
    }

    /// Check a password against the credential, or the legacy plaintext
    /// field when no credential exists.
    pub fn verify_password(&self, password: &str) -> bool {
        match (&self.credential, &self.password) {
            (Some(credential), _) => credential.verify(password),
            (None, Some(legacy)) => constant_time_eq(legacy.as_bytes(), password.as_bytes()),
            (None, None) => false,
        }
    }
}
