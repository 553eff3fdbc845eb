//! SaveCycle: one coordinated write of a session to both stores.
//!
//! 1. snapshot fields (with their revision) and position;
//! 2. write the local snapshot (best-effort);
//! 3. enter `saving`, upsert the remote draft;
//! 4. `saved` + `last_saved_at` on success, `error` on failure.
//!
//! The whole cycle runs under the session write lock, which it shares with
//! submission, so a save never interleaves with a submit.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, warn};

use crate::fields::FieldStore;
use crate::navigation::SectionNavigator;
use crate::storage::{LocalSnapshotStore, RemoteDraftStore};
use crate::types::{SessionKey, SessionMeta, SurveySession};

use super::scheduler::SaveTarget;
use super::status::SaveStatusMachine;

/// Result of one save cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Both stores hold the snapshot taken at `revision`.
    Saved { at: DateTime<Utc>, revision: u64 },
    /// The remote write failed; only the local snapshot was updated.
    LocalOnly { error: String },
    /// Nothing changed since the last successful save.
    Unchanged,
    /// The session is completed; nothing was written.
    Skipped,
}

pub struct SaveCycle {
    pub(crate) key: SessionKey,
    pub(crate) fields: Arc<FieldStore>,
    pub(crate) navigator: Arc<SectionNavigator>,
    pub(crate) local: Arc<LocalSnapshotStore>,
    pub(crate) remote: Arc<RemoteDraftStore>,
    pub(crate) status: SaveStatusMachine,
    pub(crate) meta: Arc<Mutex<SessionMeta>>,
    pub(crate) write_lock: Arc<TokioMutex<()>>,
    pub(crate) default_email: Option<String>,
}

impl SaveCycle {
    pub async fn run(&self) -> SaveOutcome {
        let _guard = self.write_lock.lock().await;

        let saved_revision = {
            let meta = self.meta.lock();
            if meta.status.is_completed() {
                debug!(session = %self.key, "save skipped; session is completed");
                return SaveOutcome::Skipped;
            }
            meta.saved_revision
        };
        if self.fields.is_frozen() {
            return SaveOutcome::Skipped;
        }

        let (fields, revision) = self.fields.snapshot_at_revision();
        if saved_revision == Some(revision) {
            debug!(session = %self.key, revision, "save skipped; nothing changed");
            return SaveOutcome::Unchanged;
        }

        let position = self.navigator.position();
        self.local.write_fields(&self.key, &fields, Utc::now());

        let mut session = SurveySession::new(self.key.clone());
        session.fields = fields;
        session.current_section = position.section;
        session.scroll_offset = position.scroll_offset;

        self.status.begin_save();
        match self
            .remote
            .upsert_draft(&session, self.default_email.as_deref())
            .await
        {
            Ok(record) => {
                {
                    let mut meta = self.meta.lock();
                    meta.last_saved_at = Some(record.updated_at);
                    meta.saved_revision = Some(revision);
                }
                self.fields.clear_dirty_through(revision);
                self.status.succeed();
                SaveOutcome::Saved {
                    at: record.updated_at,
                    revision,
                }
            }
            Err(e) => {
                warn!(
                    session = %self.key,
                    revision,
                    error = %e,
                    "remote autosave failed; edits kept locally"
                );
                self.status.fail();
                SaveOutcome::LocalOnly {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl SaveTarget for SaveCycle {
    async fn save(&self) -> SaveOutcome {
        self.run().await
    }
}
