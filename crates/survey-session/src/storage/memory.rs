//! In-memory backends, for tests and ephemeral sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ConflictError, LocalStorageError, RemoteStorageError};
use crate::types::{DraftRecord, SessionKey};

use super::traits::{DraftBackend, SnapshotBackend};

// ============================================================================
// MemorySnapshotBackend
// ============================================================================

#[derive(Default)]
pub struct MemorySnapshotBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySnapshotBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SnapshotBackend for MemorySnapshotBackend {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), LocalStorageError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LocalStorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// MemoryDraftBackend
// ============================================================================

/// Vector-backed draft table. Inserts for a key that already has a row are
/// rejected with a conflict, the way a remote store with a late-added unique
/// index would.
#[derive(Default)]
pub struct MemoryDraftBackend {
    rows: Mutex<Vec<DraftRecord>>,
}

impl MemoryDraftBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored row, in insertion order.
    pub fn records(&self) -> Vec<DraftRecord> {
        self.rows.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl DraftBackend for MemoryDraftBackend {
    async fn find(&self, key: &SessionKey) -> Result<Option<DraftRecord>, RemoteStorageError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|r| r.user_id == key.user_id && r.survey_key == key.survey_key)
            .cloned())
    }

    async fn insert(&self, record: &DraftRecord) -> Result<(), RemoteStorageError> {
        let mut rows = self.rows.lock();
        if rows
            .iter()
            .any(|r| r.user_id == record.user_id && r.survey_key == record.survey_key)
        {
            return Err(ConflictError {
                user_id: record.user_id.to_string(),
                survey_key: record.survey_key.to_string(),
            }
            .into());
        }
        rows.push(record.clone());
        Ok(())
    }

    async fn update(&self, record: &DraftRecord) -> Result<(), RemoteStorageError> {
        let mut rows = self.rows.lock();
        match rows.iter_mut().find(|r| r.id == record.id) {
            Some(row) => {
                *row = record.clone();
                Ok(())
            }
            None => Err(RemoteStorageError::NotFound {
                user_id: record.user_id.to_string(),
                survey_key: record.survey_key.to_string(),
            }),
        }
    }
}
