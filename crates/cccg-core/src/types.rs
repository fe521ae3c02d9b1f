//! Core types for the character vault

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PersistError;

/// Display name of the director's own character
pub const DIRECTOR_CHARACTER_NAME: &str = "The DM";

/// Name the director's character is stored under
const DIRECTOR_STORAGE_NAME: &str = "DM";

/// Names older releases stored the director's character under
const LEGACY_DIRECTOR_NAMES: [&str; 2] = ["Shawn", "Player :Shawn"];

/// Reserved top-level field holding device-local UI echo state
pub const UI_FIELD: &str = "ui";

/// Map a display name to the name it is stored under.
///
/// Trims surrounding whitespace and folds "The DM", along with the names
/// older releases used for the director ("Shawn", "Player :Shawn"), onto the
/// "DM" key.
pub fn canonical_character_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed == DIRECTOR_CHARACTER_NAME || LEGACY_DIRECTOR_NAMES.contains(&trimmed) {
        DIRECTOR_STORAGE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Inverse of [`canonical_character_name`] for display.
pub fn friendly_character_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed == DIRECTOR_STORAGE_NAME {
        DIRECTOR_CHARACTER_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Current wall-clock time in Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Role prefix of a save key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyRole {
    /// Character sheets (`player:<name>`)
    Player,
    /// Profile/credential records (`user:<name>`)
    User,
}

impl KeyRole {
    /// The literal prefix including the colon
    pub fn prefix(&self) -> &'static str {
        match self {
            KeyRole::Player => "player:",
            KeyRole::User => "user:",
        }
    }
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyRole::Player => write!(f, "player"),
            KeyRole::User => write!(f, "user"),
        }
    }
}

/// Stable identifier of a saved record: role prefix + name.
///
/// Comparison is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SaveKey {
    role: KeyRole,
    name: String,
}

impl SaveKey {
    /// Build a key for a role, canonicalizing the name.
    ///
    /// Legacy director aliases only apply to character sheets; a profile
    /// named "Shawn" stays `user:Shawn`.
    pub fn new(role: KeyRole, name: &str) -> Result<Self, PersistError> {
        let name = match role {
            KeyRole::Player => canonical_character_name(name),
            KeyRole::User if name.trim() == DIRECTOR_CHARACTER_NAME => {
                DIRECTOR_STORAGE_NAME.to_string()
            }
            KeyRole::User => name.trim().to_string(),
        };
        if name.is_empty() {
            return Err(PersistError::InvalidKey(format!(
                "empty {} name",
                role
            )));
        }
        Ok(Self { role, name })
    }

    /// Key of a character sheet
    pub fn player(name: &str) -> Result<Self, PersistError> {
        Self::new(KeyRole::Player, name)
    }

    /// Key of a profile/credential record
    pub fn user(name: &str) -> Result<Self, PersistError> {
        Self::new(KeyRole::User, name)
    }

    /// Parse `player:<name>` or `user:<name>`.
    pub fn parse(raw: &str) -> Result<Self, PersistError> {
        for role in [KeyRole::Player, KeyRole::User] {
            if let Some(name) = raw.strip_prefix(role.prefix()) {
                return Self::new(role, name);
            }
        }
        Err(PersistError::InvalidKey(format!(
            "'{}' has no player:/user: prefix",
            raw
        )))
    }

    /// Role prefix of this key
    pub fn role(&self) -> KeyRole {
        self.role
    }

    /// Name as stored (after canonicalization)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name as shown to people ("DM" reads as "The DM")
    pub fn display_name(&self) -> String {
        friendly_character_name(&self.name)
    }

    /// True for the director's own character sheet
    pub fn is_director_character(&self) -> bool {
        self.role == KeyRole::Player && self.name == DIRECTOR_STORAGE_NAME
    }

    /// Same name under a different role
    pub fn with_role(&self, role: KeyRole) -> Self {
        Self {
            role,
            name: self.name.clone(),
        }
    }

    /// Full string form, e.g. `player:Eve`
    pub fn as_string(&self) -> String {
        format!("{}{}", self.role.prefix(), self.name)
    }
}

impl std::fmt::Display for SaveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.role.prefix(), self.name)
    }
}

impl TryFrom<String> for SaveKey {
    type Error = PersistError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SaveKey> for String {
    fn from(key: SaveKey) -> Self {
        key.as_string()
    }
}

/// An opaque character or profile record.
///
/// The persistence layer only cares that it is a JSON object; the one field
/// with meaning here is the top-level `ui` subtree, which never leaves the
/// device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Convert a JSON value into a record; anything but an object is rejected.
    pub fn from_value(value: Value) -> Result<Self, PersistError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(PersistError::Serialization(format!(
                "record must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Parse a record from its JSON text
    pub fn from_json(text: &str) -> Result<Self, PersistError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Serialize to compact JSON text
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Borrow the underlying map
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutably borrow the underlying map
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    /// Look up a top-level field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a top-level field, returning the previous value
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// True when the record has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the device-local `ui` subtree is present
    pub fn has_ui(&self) -> bool {
        self.0.contains_key(UI_FIELD)
    }

    /// Last-modified time in Unix milliseconds.
    ///
    /// Reads `updatedAt`, falling back to `meta.updatedAt`; 0 when neither is
    /// a finite number.
    pub fn updated_at(&self) -> i64 {
        let direct = self.0.get("updatedAt").and_then(as_millis);
        let nested = || {
            self.0
                .get("meta")
                .and_then(|meta| meta.get("updatedAt"))
                .and_then(as_millis)
        };
        direct.or_else(nested).unwrap_or(0)
    }

    /// Consume into a JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn as_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
