//! Storage backend traits.
//!
//! Backends are the narrow raw I/O layer; they know nothing about sessions,
//! placeholder columns or draft semantics. [`LocalSnapshotStore`] and
//! [`RemoteDraftStore`] put the session rules on top.
//!
//! [`LocalSnapshotStore`]: super::local::LocalSnapshotStore
//! [`RemoteDraftStore`]: super::remote::RemoteDraftStore

use async_trait::async_trait;

use crate::error::{LocalStorageError, RemoteStorageError};
use crate::types::{DraftRecord, SessionKey};

/// Same-device string key/value cache (browser-local-storage shaped).
///
/// Implementors must be `Send + Sync` so one backend can serve many sessions.
pub trait SnapshotBackend: Send + Sync {
    /// Read the value at `key`; `None` if it was never written or was removed.
    fn get(&self, key: &str) -> Result<Option<String>, LocalStorageError>;

    /// Insert or replace the value at `key`.
    fn put(&self, key: &str, value: &str) -> Result<(), LocalStorageError>;

    /// Delete `key`. Deleting a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), LocalStorageError>;
}

/// Durable store of draft records.
///
/// No uniqueness constraint on (user, survey) is assumed; callers look up
/// before they write. A backend that does detect a duplicate on insert
/// reports it as [`RemoteStorageError::Conflict`].
#[async_trait]
pub trait DraftBackend: Send + Sync {
    /// Fetch the record for `key`, whatever its status.
    async fn find(&self, key: &SessionKey) -> Result<Option<DraftRecord>, RemoteStorageError>;

    /// Store a new record.
    async fn insert(&self, record: &DraftRecord) -> Result<(), RemoteStorageError>;

    /// Replace the record with the same `id`. Fails with
    /// [`RemoteStorageError::NotFound`] if there is none.
    async fn update(&self, record: &DraftRecord) -> Result<(), RemoteStorageError>;
}
