//! LocalSnapshotStore: best-effort same-device cache of a session.
//!
//! Two entries per session: the field map (with the time it was written) and
//! the section position. They are written independently; navigation only
//! touches the position, autosave only the fields.
//!
//! Nothing here returns an error. Backend and serialization failures are
//! logged with `tracing::warn!` and reported as `false` / `None`, since the
//! remote store is the authority.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::LocalStorageError;
use crate::types::{
    FieldMap, LocalFields, LocalSnapshot, SectionPosition, SessionKey, SurveySession,
};

use super::traits::SnapshotBackend;

pub struct LocalSnapshotStore {
    backend: Arc<dyn SnapshotBackend>,
    prefix: String,
}

impl LocalSnapshotStore {
    pub fn new(backend: Arc<dyn SnapshotBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    pub fn fields_key(&self, key: &SessionKey) -> String {
        format!("{}:{}:{}:fields", self.prefix, key.user_id, key.survey_key)
    }

    pub fn position_key(&self, key: &SessionKey) -> String {
        format!("{}:{}:{}:position", self.prefix, key.user_id, key.survey_key)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Cache the whole session: fields stamped with the current time, plus
    /// its position. Returns `true` only if both entries were written.
    pub fn write(&self, session: &SurveySession) -> bool {
        let key = session.key();
        let fields_ok = self.write_fields(&key, &session.fields, Utc::now());
        let position_ok = self.write_position(&key, session.position());
        fields_ok && position_ok
    }

    pub fn write_fields(
        &self,
        key: &SessionKey,
        fields: &FieldMap,
        saved_at: DateTime<Utc>,
    ) -> bool {
        let entry = LocalFields {
            fields: fields.clone(),
            saved_at,
        };
        self.put_json(&self.fields_key(key), &entry)
    }

    pub fn write_position(&self, key: &SessionKey, position: SectionPosition) -> bool {
        self.put_json(&self.position_key(key), &position)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Everything cached for `key`, or `None` when nothing usable is stored.
    /// A corrupt entry counts as missing.
    pub fn read(&self, key: &SessionKey) -> Option<LocalSnapshot> {
        let snapshot = LocalSnapshot {
            fields: self.get_json::<LocalFields>(&self.fields_key(key)),
            position: self.get_json::<SectionPosition>(&self.position_key(key)),
        };
        if snapshot.is_empty() {
            None
        } else {
            Some(snapshot)
        }
    }

    /// Remove both entries for `key`.
    pub fn clear(&self, key: &SessionKey) {
        for k in [self.fields_key(key), self.position_key(key)] {
            if let Err(e) = self.backend.remove(&k) {
                log_failure("clear", &k, &e);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let result = serde_json::to_string(value)
            .map_err(|source| LocalStorageError::Serialization {
                key: key.to_string(),
                source,
            })
            .and_then(|json| self.backend.put(key, &json));
        match result {
            Ok(()) => true,
            Err(e) => {
                log_failure("write", key, &e);
                false
            }
        }
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                log_failure("read", key, &e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(source) => {
                let e = LocalStorageError::Serialization {
                    key: key.to_string(),
                    source,
                };
                log_failure("read", key, &e);
                None
            }
        }
    }
}

fn log_failure(op: &str, key: &str, error: &LocalStorageError) {
    warn!(op, key, error = %error, "local snapshot {op} failed; continuing without it");
}
