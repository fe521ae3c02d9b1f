//! In-process cloud store.
//!
//! Documents are kept in a tree keyed by path. Every call is appended to a
//! log so tests can assert what was contacted and in which order, and a
//! failure can be injected to simulate an outage or a rejected request.
//!
//! Reads return only a document written at exactly that path; parents are
//! not assembled from their children.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::Value;

use super::{CloudPath, CloudStore};
use crate::error::{PersistError, PersistResult};

/// One recorded call, carrying the path it targeted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudCall {
    Put(String),
    Get(String),
    Delete(String),
    List(String),
}

impl CloudCall {
    /// Path the call targeted
    pub fn path(&self) -> &str {
        match self {
            CloudCall::Put(p) | CloudCall::Get(p) | CloudCall::Delete(p) | CloudCall::List(p) => p,
        }
    }
}

/// Failure injected into every subsequent call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedFailure {
    /// Transport failure
    Offline,
    /// Non-success status with a body
    Status(u16, String),
    /// 2xx with an unparseable body
    Malformed,
}

impl SimulatedFailure {
    fn to_error(&self, path: &CloudPath) -> PersistError {
        match self {
            SimulatedFailure::Offline => {
                PersistError::NetworkUnreachable(format!("simulated outage at {}", path))
            }
            SimulatedFailure::Status(status, body) => PersistError::Http {
                status: *status,
                body: body.clone(),
            },
            SimulatedFailure::Malformed => {
                PersistError::MalformedResponse(format!("simulated garbage at {}", path))
            }
        }
    }
}

/// Cloud store living in memory
#[derive(Debug, Default)]
pub struct MemoryCloud {
    documents: RwLock<BTreeMap<CloudPathKey, Value>>,
    calls: RwLock<Vec<CloudCall>>,
    failure: RwLock<Option<SimulatedFailure>>,
}

/// Segment list used as the map key so children sort under their parent
type CloudPathKey = Vec<String>;

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without recording a call
    pub fn insert(&self, path: &CloudPath, value: Value) {
        let mut docs = self.documents.write();
        remove_subtree(&mut docs, path);
        docs.insert(path.segments().to_vec(), value);
    }

    /// Read a document without recording a call
    pub fn document(&self, path: &CloudPath) -> Option<Value> {
        self.documents.read().get(path.segments()).cloned()
    }

    /// Number of documents stored
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Calls made so far, oldest first
    pub fn calls(&self) -> Vec<CloudCall> {
        self.calls.read().clone()
    }

    /// Forget the call log
    pub fn clear_calls(&self) {
        self.calls.write().clear();
    }

    /// Make every following call fail (or succeed again with `None`)
    pub fn set_failure(&self, failure: Option<SimulatedFailure>) {
        *self.failure.write() = failure;
    }

    fn record(&self, call: CloudCall) {
        self.calls.write().push(call);
    }

    fn check_failure(&self, path: &CloudPath) -> PersistResult<()> {
        match &*self.failure.read() {
            Some(failure) => Err(failure.to_error(path)),
            None => Ok(()),
        }
    }
}

fn is_below(candidate: &[String], root: &[String]) -> bool {
    candidate.len() >= root.len() && candidate[..root.len()] == root[..]
}

fn remove_subtree(docs: &mut BTreeMap<CloudPathKey, Value>, path: &CloudPath) {
    let root = path.segments();
    docs.retain(|k, _| !is_below(k, root) && !is_below(root, k));
}

impl CloudStore for MemoryCloud {
    async fn put(&self, path: &CloudPath, body: &Value) -> PersistResult<()> {
        self.record(CloudCall::Put(path.to_string()));
        self.check_failure(path)?;
        self.insert(path, body.clone());
        Ok(())
    }

    async fn get(&self, path: &CloudPath) -> PersistResult<Option<Value>> {
        self.record(CloudCall::Get(path.to_string()));
        self.check_failure(path)?;
        Ok(self.document(path))
    }

    async fn delete(&self, path: &CloudPath) -> PersistResult<()> {
        self.record(CloudCall::Delete(path.to_string()));
        self.check_failure(path)?;
        let root = path.segments();
        self.documents.write().retain(|k, _| !is_below(k, root));
        Ok(())
    }

    async fn list_children(&self, path: &CloudPath) -> PersistResult<Vec<String>> {
        self.record(CloudCall::List(path.to_string()));
        self.check_failure(path)?;
        let root = path.segments();
        let mut children: Vec<String> = self
            .documents
            .read()
            .keys()
            .filter(|k| k.len() > root.len() && is_below(k, root))
            .map(|k| k[root.len()].clone())
            .collect();
        children.dedup();
        Ok(children)
    }
}
