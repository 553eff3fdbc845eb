//! Session lifecycle: mounting, editing, submitting.
//!
//! [`SessionManager::open`] resolves a (user, survey) pair into either an
//! [`EditingSession`] (draft, with autosave running) or a read-only
//! [`CompletedSession`]. A completed session never exposes the editing API.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, warn};

use crate::autosave::{
    AutosaveScheduler, SaveCycle, SaveOutcome, SaveStatus, SaveStatusMachine, SaveTarget,
};
use crate::completion::CompletionIndex;
use crate::config::SessionOptions;
use crate::error::{Result, SurveyError};
use crate::fields::FieldStore;
use crate::navigation::SectionNavigator;
use crate::reactive::{FieldChange, StatusTransition, Unsubscribe};
use crate::storage::{DraftBackend, LocalSnapshotStore, RemoteDraftStore, SnapshotBackend};
use crate::submission::{IdentityProvider, SchemaValidator, SubmissionCoordinator};
use crate::types::{
    DraftRecord, FieldMap, FieldValue, SectionPosition, SessionKey, SessionMeta, SessionStatus,
    SurveyKey, SurveySession,
};

// ============================================================================
// SessionManager
// ============================================================================

pub struct SessionManager {
    options: SessionOptions,
    local: Arc<LocalSnapshotStore>,
    remote: Arc<RemoteDraftStore>,
    validator: Arc<dyn SchemaValidator>,
    identity: Arc<dyn IdentityProvider>,
}

/// Where the restored field map came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    Remote,
    Local,
    Fresh,
}

impl SessionManager {
    pub fn new(
        options: SessionOptions,
        snapshots: Arc<dyn SnapshotBackend>,
        drafts: Arc<dyn DraftBackend>,
        validator: Arc<dyn SchemaValidator>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let local = Arc::new(LocalSnapshotStore::new(
            snapshots,
            options.local_key_prefix(),
        ));
        let remote = Arc::new(
            RemoteDraftStore::new(drafts, options.draft_columns.clone())
                .with_survey_columns(options.draft_columns_by_survey()),
        );
        Self {
            options,
            local,
            remote,
            validator,
            identity,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn local_store(&self) -> &Arc<LocalSnapshotStore> {
        &self.local
    }

    pub fn remote_store(&self) -> &Arc<RemoteDraftStore> {
        &self.remote
    }

    /// A completion index over `editions` backed by this manager's remote
    /// store.
    pub fn completion_index(
        &self,
        editions: impl IntoIterator<Item = SurveyKey>,
    ) -> CompletionIndex {
        CompletionIndex::new(Arc::clone(&self.remote), editions, None)
    }

    /// Mount the session for the current user and `survey_key`.
    ///
    /// 1. A completed record wins outright: read-only view, stale local
    ///    snapshot removed.
    /// 2. Otherwise the remote draft and the local snapshot are both read;
    ///    remote failures degrade to "no remote draft".
    /// 3. The newer field map wins (remote on ties). When the local copy
    ///    wins, an autosave is armed so the remote catches up.
    /// 4. Position comes from the local snapshot when it is past section 1,
    ///    else from the remote draft, else section 1.
    pub async fn open(&self, survey_key: impl Into<SurveyKey>) -> Result<OpenedSession> {
        let key = SessionKey {
            user_id: self.identity.user_id(),
            survey_key: survey_key.into(),
        };

        match self.remote.load_completed(&key).await {
            Ok(Some(session)) => {
                self.local.clear(&key);
                debug!(session = %key, "opened completed session read-only");
                return Ok(OpenedSession::Completed(CompletedSession { session }));
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    session = %key,
                    error = %e,
                    "could not check completion status; opening as draft"
                );
            }
        }

        let remote_draft = match self.remote.load_draft(&key).await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(
                    session = %key,
                    error = %e,
                    "remote draft unavailable; restoring from local snapshot"
                );
                None
            }
        };
        let local = self.local.read(&key).unwrap_or_default();

        let remote_saved_at = remote_draft.as_ref().and_then(|s| s.last_saved_at);
        let remote_position = remote_draft.as_ref().map(SurveySession::position);

        let (fields, source) = match (remote_draft, local.fields) {
            (Some(_), Some(local_fields))
                if remote_saved_at.map_or(true, |at| local_fields.saved_at > at) =>
            {
                debug!(session = %key, "local snapshot is newer than remote draft");
                (local_fields.fields, RestoreSource::Local)
            }
            (Some(remote), _) => (remote.fields, RestoreSource::Remote),
            (None, Some(local_fields)) => (local_fields.fields, RestoreSource::Local),
            (None, None) => (FieldMap::new(), RestoreSource::Fresh),
        };

        let navigator = Arc::new(SectionNavigator::restore(
            key.clone(),
            self.options.total_sections(),
            Arc::clone(&self.local),
            local.position,
            remote_position,
        ));

        let fields_store = Arc::new(FieldStore::new(key.clone()));
        fields_store.hydrate(fields);

        let meta = Arc::new(Mutex::new(SessionMeta {
            status: SessionStatus::Draft,
            last_saved_at: remote_saved_at,
            completed_at: None,
            saved_revision: match source {
                RestoreSource::Remote => Some(fields_store.revision()),
                RestoreSource::Local | RestoreSource::Fresh => None,
            },
        }));

        let session = EditingSession::start(EditingParts {
            key,
            fields: fields_store,
            navigator,
            local: Arc::clone(&self.local),
            remote: Arc::clone(&self.remote),
            status: SaveStatusMachine::new(self.options.status_reset),
            meta,
            validator: Arc::clone(&self.validator),
            default_email: self.identity.default_email(),
            options: &self.options,
            source,
        });

        if source == RestoreSource::Local {
            session.scheduler.on_field_change();
        }

        Ok(OpenedSession::Editing(session))
    }
}

// ============================================================================
// OpenedSession
// ============================================================================

pub enum OpenedSession {
    Editing(EditingSession),
    Completed(CompletedSession),
}

impl OpenedSession {
    pub fn is_completed(&self) -> bool {
        matches!(self, OpenedSession::Completed(_))
    }

    pub fn into_editing(self) -> Option<EditingSession> {
        match self {
            OpenedSession::Editing(s) => Some(s),
            OpenedSession::Completed(_) => None,
        }
    }

    pub fn into_completed(self) -> Option<CompletedSession> {
        match self {
            OpenedSession::Completed(s) => Some(s),
            OpenedSession::Editing(_) => None,
        }
    }
}

// ============================================================================
// CompletedSession
// ============================================================================

/// Read-only view of a submitted survey.
#[derive(Debug, Clone)]
pub struct CompletedSession {
    session: SurveySession,
}

impl CompletedSession {
    pub fn key(&self) -> SessionKey {
        self.session.key()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.session.fields.get(name)
    }

    pub fn fields(&self) -> &FieldMap {
        &self.session.fields
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.session.completed_at
    }

    pub fn session(&self) -> &SurveySession {
        &self.session
    }
}

// ============================================================================
// EditingSession
// ============================================================================

struct EditingParts<'a> {
    key: SessionKey,
    fields: Arc<FieldStore>,
    navigator: Arc<SectionNavigator>,
    local: Arc<LocalSnapshotStore>,
    remote: Arc<RemoteDraftStore>,
    status: SaveStatusMachine,
    meta: Arc<Mutex<SessionMeta>>,
    validator: Arc<dyn SchemaValidator>,
    default_email: Option<String>,
    options: &'a SessionOptions,
    source: RestoreSource,
}

/// A draft being edited. Field writes go through [`set`](Self::set) and
/// friends; autosave runs in the background until the session is dropped,
/// closed or submitted.
pub struct EditingSession {
    key: SessionKey,
    fields: Arc<FieldStore>,
    navigator: Arc<SectionNavigator>,
    status: SaveStatusMachine,
    meta: Arc<Mutex<SessionMeta>>,
    write_lock: Arc<TokioMutex<()>>,
    scheduler: Arc<AutosaveScheduler>,
    coordinator: SubmissionCoordinator,
    default_email: Option<String>,
    source: RestoreSource,
    unsubscribe: Mutex<Option<Unsubscribe>>,
}

impl EditingSession {
    fn start(parts: EditingParts<'_>) -> Self {
        let write_lock = Arc::new(TokioMutex::new(()));
        let cycle: Arc<dyn SaveTarget> = Arc::new(SaveCycle {
            key: parts.key.clone(),
            fields: Arc::clone(&parts.fields),
            navigator: Arc::clone(&parts.navigator),
            local: Arc::clone(&parts.local),
            remote: Arc::clone(&parts.remote),
            status: parts.status.clone(),
            meta: Arc::clone(&parts.meta),
            write_lock: Arc::clone(&write_lock),
            default_email: parts.default_email.clone(),
        });
        let scheduler = Arc::new(AutosaveScheduler::spawn(cycle, parts.options.debounce()));

        let weak: Weak<AutosaveScheduler> = Arc::downgrade(&scheduler);
        let unsubscribe = parts.fields.subscribe(move |_change| {
            if let Some(scheduler) = weak.upgrade() {
                scheduler.on_field_change();
            }
        });

        let coordinator =
            SubmissionCoordinator::new(parts.validator, parts.remote, parts.local);

        Self {
            key: parts.key,
            fields: parts.fields,
            navigator: parts.navigator,
            status: parts.status,
            meta: parts.meta,
            write_lock,
            scheduler,
            coordinator,
            default_email: parts.default_email,
            source: parts.source,
            unsubscribe: Mutex::new(Some(unsubscribe)),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Which store the field map was restored from on mount.
    pub fn restored_from(&self) -> RestoreSource {
        self.source
    }

    pub fn is_completed(&self) -> bool {
        self.meta.lock().status.is_completed()
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.meta.lock().last_saved_at
    }

    // -----------------------------------------------------------------------
    // Fields
    // -----------------------------------------------------------------------

    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.fields.get(name)
    }

    /// Deep copy of every field.
    pub fn fields(&self) -> FieldMap {
        self.fields.snapshot()
    }

    /// Write a field and restart the autosave debounce. Fails with
    /// [`SurveyError::ReadOnly`] once the session is completed.
    pub fn set(&self, name: &str, value: impl Into<FieldValue>) -> Result<bool> {
        self.fields.set(name, value)
    }

    pub fn set_rank(&self, name: &str, item: &str, rank: Option<&str>) -> Result<bool> {
        self.fields.set_rank(name, item, rank)
    }

    pub fn remove(&self, name: &str) -> Result<bool> {
        self.fields.remove(name)
    }

    /// Fields written since the last successful remote save.
    pub fn dirty_fields(&self) -> Vec<String> {
        self.fields.dirty_fields()
    }

    pub fn subscribe_fields(
        &self,
        callback: impl Fn(&FieldChange) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.fields.subscribe(callback)
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    pub fn current_section(&self) -> u32 {
        self.navigator.current()
    }

    pub fn total_sections(&self) -> u32 {
        self.navigator.total_sections()
    }

    pub fn position(&self) -> SectionPosition {
        self.navigator.position()
    }

    pub fn go_to(&self, section: u32) -> bool {
        self.navigator.go_to(section)
    }

    pub fn next_section(&self) -> bool {
        self.navigator.next()
    }

    pub fn previous_section(&self) -> bool {
        self.navigator.previous()
    }

    pub fn set_scroll_offset(&self, offset: u64) {
        self.navigator.set_scroll_offset(offset)
    }

    // -----------------------------------------------------------------------
    // Saving
    // -----------------------------------------------------------------------

    pub fn save_status(&self) -> SaveStatus {
        self.status.status()
    }

    pub fn watch_save_status(&self) -> watch::Receiver<SaveStatus> {
        self.status.watch()
    }

    pub fn on_save_status(
        &self,
        callback: impl Fn(&StatusTransition) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.status.on_transition(callback)
    }

    pub fn has_pending_save(&self) -> bool {
        self.scheduler.has_pending()
    }

    /// Save immediately instead of waiting for the debounce.
    pub async fn save_now(&self) -> Result<SaveOutcome> {
        if self.is_completed() {
            return Ok(SaveOutcome::Skipped);
        }
        self.scheduler.flush().await
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate and finalize the survey.
    ///
    /// Waits for any in-flight autosave, then runs the submission. On success
    /// the session turns read-only and autosave stops. On failure it stays a
    /// draft with every edit intact, and autosave resumes if anything is
    /// unsaved.
    pub async fn submit(&self) -> Result<DraftRecord> {
        self.scheduler.cancel();
        let _guard = self.write_lock.lock().await;

        if self.is_completed() {
            return Err(self.read_only());
        }

        let (fields, revision) = self.fields.snapshot_at_revision();
        let session = self.build_session(fields);

        match self
            .coordinator
            .submit(&session, self.default_email.as_deref())
            .await
        {
            Ok(record) => {
                self.fields.freeze();
                self.navigator.freeze();
                {
                    let mut meta = self.meta.lock();
                    meta.status = SessionStatus::Completed;
                    meta.completed_at = record.completed_at;
                    meta.last_saved_at = Some(record.updated_at);
                    meta.saved_revision = Some(revision);
                }
                self.fields.clear_dirty_through(revision);
                self.close();
                Ok(record)
            }
            Err(e) => {
                if self.fields.is_dirty() {
                    self.scheduler.on_field_change();
                }
                Err(e)
            }
        }
    }

    /// Full current state of the session.
    pub fn to_session(&self) -> SurveySession {
        self.build_session(self.fields.snapshot())
    }

    fn build_session(&self, fields: FieldMap) -> SurveySession {
        let position = self.navigator.position();
        let meta = self.meta.lock();
        SurveySession {
            user_id: self.key.user_id.clone(),
            survey_key: self.key.survey_key.clone(),
            status: meta.status,
            current_section: position.section,
            scroll_offset: position.scroll_offset,
            fields,
            last_saved_at: meta.last_saved_at,
            completed_at: meta.completed_at,
        }
    }

    fn read_only(&self) -> SurveyError {
        SurveyError::ReadOnly {
            user_id: self.key.user_id.to_string(),
            survey_key: self.key.survey_key.to_string(),
        }
    }

    /// Stop autosave. A pending debounce is dropped; a save already running
    /// completes. Field writes still succeed but are no longer persisted.
    pub fn close(&self) {
        self.scheduler.dispose();
        if let Some(unsubscribe) = self.unsubscribe.lock().take() {
            unsubscribe();
        }
    }
}

impl Drop for EditingSession {
    fn drop(&mut self) {
        self.close();
    }
}
