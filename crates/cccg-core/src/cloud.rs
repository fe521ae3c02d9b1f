//! Remote document store.
//!
//! The cloud side is a document-per-path database (the Firebase Realtime
//! Database REST dialect in production). Documents live at slash-separated
//! paths:
//!
//! ```text
//! saves/<save key>                     # primary copy of a record
//! autosaves/<save key>/<timestamp-ms>  # autosave history
//! ```
//!
//! [`CloudStore`] is the seam; [`HttpCloud`] talks to the real service,
//! [`MemoryCloud`] keeps everything in-process and records every call, and
//! [`OfflineCloud`] fails every request the way an unplugged device would.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{PersistError, PersistResult};
use crate::types::SaveKey;

mod http;
mod memory;

pub use http::HttpCloud;
pub use memory::{CloudCall, MemoryCloud, SimulatedFailure};

/// Collection holding the primary copy of every record
pub const SAVES_COLLECTION: &str = "saves";

/// Collection holding autosave history
pub const AUTOSAVES_COLLECTION: &str = "autosaves";

/// Slash-separated location of a remote document.
///
/// Empty segments are dropped on construction, so `a//b` and `a/b` are the
/// same path. A save key is always a single segment, even when the name
/// contains `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CloudPath {
    segments: Vec<String>,
}

impl CloudPath {
    /// Build a path from pieces; each piece may itself contain slashes.
    pub fn new<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments = pieces
            .into_iter()
            .flat_map(|piece| {
                piece
                    .as_ref()
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { segments }
    }

    /// The `saves` collection
    pub fn saves() -> Self {
        Self::new([SAVES_COLLECTION])
    }

    /// Primary copy of a record
    pub fn save(key: &SaveKey) -> Self {
        Self::saves().key_segment(key)
    }

    /// Autosave history of a record
    pub fn autosaves(key: &SaveKey) -> Self {
        Self::new([AUTOSAVES_COLLECTION]).key_segment(key)
    }

    /// One autosave history entry
    pub fn autosave(key: &SaveKey, ts: i64) -> Self {
        Self::autosaves(key).child(&ts.to_string())
    }

    /// Append a segment
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(
            segment
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        Self { segments }
    }

    fn key_segment(mut self, key: &SaveKey) -> Self {
        self.segments.push(key.as_string());
        self
    }

    /// Path segments, unescaped
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True when `self` is `other` or lies below it
    pub fn starts_with(&self, other: &CloudPath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }
}

impl std::fmt::Display for CloudPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Asynchronous document store addressed by [`CloudPath`].
///
/// Implementations report transport failures as
/// [`PersistError::NetworkUnreachable`], non-success statuses as
/// [`PersistError::Http`] and unparseable bodies as
/// [`PersistError::MalformedResponse`].
pub trait CloudStore: Send + Sync {
    /// Replace the document at `path`.
    fn put(&self, path: &CloudPath, body: &Value) -> impl Future<Output = PersistResult<()>> + Send;

    /// Read the document at `path`; `Ok(None)` when nothing is stored there.
    fn get(&self, path: &CloudPath) -> impl Future<Output = PersistResult<Option<Value>>> + Send;

    /// Remove the document at `path` (and anything below it). Absent paths
    /// are not an error.
    fn delete(&self, path: &CloudPath) -> impl Future<Output = PersistResult<()>> + Send;

    /// Names of the direct children of `path`, unordered.
    fn list_children(
        &self,
        path: &CloudPath,
    ) -> impl Future<Output = PersistResult<Vec<String>>> + Send;
}

impl<T: CloudStore> CloudStore for Arc<T> {
    fn put(&self, path: &CloudPath, body: &Value) -> impl Future<Output = PersistResult<()>> + Send {
        (**self).put(path, body)
    }

    fn get(&self, path: &CloudPath) -> impl Future<Output = PersistResult<Option<Value>>> + Send {
        (**self).get(path)
    }

    fn delete(&self, path: &CloudPath) -> impl Future<Output = PersistResult<()>> + Send {
        (**self).delete(path)
    }

    fn list_children(
        &self,
        path: &CloudPath,
    ) -> impl Future<Output = PersistResult<Vec<String>>> + Send {
        (**self).list_children(path)
    }
}

/// Cloud store used when no endpoint is configured: every call fails with
/// [`PersistError::NetworkUnreachable`].
#[derive(Debug, Clone, Default)]
pub struct OfflineCloud;

impl OfflineCloud {
    fn unreachable(path: &CloudPath) -> PersistError {
        PersistError::NetworkUnreachable(format!("offline: no cloud endpoint for {}", path))
    }
}

impl CloudStore for OfflineCloud {
    async fn put(&self, path: &CloudPath, _body: &Value) -> PersistResult<()> {
        Err(Self::unreachable(path))
    }

    async fn get(&self, path: &CloudPath) -> PersistResult<Option<Value>> {
        Err(Self::unreachable(path))
    }

    async fn delete(&self, path: &CloudPath) -> PersistResult<()> {
        Err(Self::unreachable(path))
    }

    async fn list_children(&self, path: &CloudPath) -> PersistResult<Vec<String>> {
        Err(Self::unreachable(path))
    }
}

/// Runtime choice of cloud backend
#[derive(Debug, Clone)]
pub enum AnyCloud {
    /// Realtime Database over HTTPS
    Http(HttpCloud),
    /// In-process store
    Memory(Arc<MemoryCloud>),
    /// No backend; everything fails as unreachable
    Offline(OfflineCloud),
}

impl AnyCloud {
    /// Short backend name for logs and `info` output
    pub fn kind(&self) -> &'static str {
        match self {
            AnyCloud::Http(_) => "http",
            AnyCloud::Memory(_) => "memory",
            AnyCloud::Offline(_) => "offline",
        }
    }
}

impl CloudStore for AnyCloud {
    async fn put(&self, path: &CloudPath, body: &Value) -> PersistResult<()> {
        match self {
            AnyCloud::Http(cloud) => cloud.put(path, body).await,
            AnyCloud::Memory(cloud) => cloud.put(path, body).await,
            AnyCloud::Offline(cloud) => cloud.put(path, body).await,
        }
    }

    async fn get(&self, path: &CloudPath) -> PersistResult<Option<Value>> {
        match self {
            AnyCloud::Http(cloud) => cloud.get(path).await,
            AnyCloud::Memory(cloud) => cloud.get(path).await,
            AnyCloud::Offline(cloud) => cloud.get(path).await,
        }
    }

    async fn delete(&self, path: &CloudPath) -> PersistResult<()> {
        match self {
            AnyCloud::Http(cloud) => cloud.delete(path).await,
            AnyCloud::Memory(cloud) => cloud.delete(path).await,
            AnyCloud::Offline(cloud) => cloud.delete(path).await,
        }
    }

    async fn list_children(&self, path: &CloudPath) -> PersistResult<Vec<String>> {
        match self {
            AnyCloud::Http(cloud) => cloud.list_children(path).await,
            AnyCloud::Memory(cloud) => cloud.list_children(path).await,
            AnyCloud::Offline(cloud) => cloud.list_children(path).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_drops_empty_segments() {
        let path = CloudPath::new(["saves", "multi//slash//name"]);
        assert_eq!(path.segments(), &["saves", "multi", "slash", "name"]);
        assert_eq!(path.to_string(), "saves/multi/slash/name");
    }

    #[test]
    fn test_save_and_autosave_paths() {
        let key = SaveKey::player("Eve").unwrap();
        assert_eq!(CloudPath::save(&key).to_string(), "saves/player:Eve");
        assert_eq!(
            CloudPath::autosave(&key, 1700).to_string(),
            "autosaves/player:Eve/1700"
        );
        assert!(CloudPath::autosave(&key, 1700).starts_with(&CloudPath::autosaves(&key)));
        assert!(!CloudPath::saves().starts_with(&CloudPath::autosaves(&key)));
    }

    #[test]
    fn test_slash_in_name_stays_one_segment() {
        let key = SaveKey::player("Ash/Alt").unwrap();
        let path = CloudPath::save(&key);
        assert_eq!(path.segments(), &["saves", "player:Ash/Alt"]);

        let sibling = CloudPath::save(&SaveKey::player("Ash").unwrap());
        assert!(!path.starts_with(&sibling));
        assert_eq!(
            CloudPath::autosave(&key, 5).segments(),
            &["autosaves", "player:Ash/Alt", "5"]
        );
    }

    #[tokio::test]
    async fn test_offline_cloud_is_unreachable() {
        let cloud = AnyCloud::Offline(OfflineCloud);
        let err = cloud.get(&CloudPath::saves()).await.unwrap_err();
        assert!(matches!(err, PersistError::NetworkUnreachable(_)));
        assert_eq!(cloud.kind(), "offline");
    }
}
