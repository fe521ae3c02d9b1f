//! Strip device-local UI state before a record leaves the device.
//!
//! The `ui` subtree holds scroll offsets and focused-input caches keyed by
//! selector strings. It has no meaning on another device, so it never goes
//! into a remote write.

use crate::types::{Record, UI_FIELD};

/// Deep copy of `record` without its top-level `ui` field.
///
/// Idempotent; every other field is preserved exactly and the input is left
/// untouched.
pub fn sanitize_for_cloud(record: &Record) -> Record {
    let mut copy = record.clone();
    copy.fields_mut().remove(UI_FIELD);
    copy
}

impl Record {
    /// See [`sanitize_for_cloud`].
    pub fn sanitized_for_cloud(&self) -> Record {
        sanitize_for_cloud(self)
    }
}
