//! RemoteDraftStore: durable, cross-device persistence keyed by
//! (user, survey).
//!
//! Every write is lookup-then-branch: find the existing row, update it in
//! place if there is one, insert otherwise. An insert that still loses a race
//! (`Conflict`) is retried as an update, so at most one row ever exists per
//! key. Errors are returned, never swallowed; callers decide how to degrade.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::{placeholder_email, DraftColumns};
use crate::error::RemoteStorageError;
use crate::types::{DraftRecord, FieldMap, SessionKey, SessionStatus, SurveyKey, SurveySession};

use super::traits::DraftBackend;

pub struct RemoteDraftStore {
    backend: Arc<dyn DraftBackend>,
    columns: DraftColumns,
    columns_by_survey: BTreeMap<String, DraftColumns>,
}

impl RemoteDraftStore {
    /// `columns` applies to every edition until overridden with
    /// [`with_survey_columns`](Self::with_survey_columns).
    pub fn new(backend: Arc<dyn DraftBackend>, columns: DraftColumns) -> Self {
        Self {
            backend,
            columns,
            columns_by_survey: BTreeMap::new(),
        }
    }

    pub fn with_survey_columns(mut self, by_survey: BTreeMap<String, DraftColumns>) -> Self {
        self.columns_by_survey = by_survey;
        self
    }

    /// Column set used for draft rows of `survey_key`.
    pub fn columns_for(&self, survey_key: &SurveyKey) -> &DraftColumns {
        self.columns_by_survey
            .get(survey_key.as_str())
            .unwrap_or(&self.columns)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The session for `key` if its record is still a draft.
    pub async fn load_draft(
        &self,
        key: &SessionKey,
    ) -> Result<Option<SurveySession>, RemoteStorageError> {
        self.load_with_status(key, SessionStatus::Draft).await
    }

    /// The session for `key` if its record has been completed.
    pub async fn load_completed(
        &self,
        key: &SessionKey,
    ) -> Result<Option<SurveySession>, RemoteStorageError> {
        self.load_with_status(key, SessionStatus::Completed).await
    }

    async fn load_with_status(
        &self,
        key: &SessionKey,
        status: SessionStatus,
    ) -> Result<Option<SurveySession>, RemoteStorageError> {
        Ok(self
            .backend
            .find(key)
            .await?
            .filter(|r| r.status == status)
            .map(DraftRecord::into_session))
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Write `session` as a draft, creating the row on first save.
    ///
    /// `default_email` comes from the identity provider and is used when the
    /// form has no email yet. A completed row is never overwritten.
    pub async fn upsert_draft(
        &self,
        session: &SurveySession,
        default_email: Option<&str>,
    ) -> Result<DraftRecord, RemoteStorageError> {
        let key = session.key();
        let now = Utc::now();

        if let Some(existing) = self.backend.find(&key).await? {
            return self.update_existing(existing, session, default_email, now).await;
        }

        let record = self.build_record(Uuid::new_v4(), session, default_email, now);
        match self.backend.insert(&record).await {
            Ok(()) => Ok(record),
            Err(RemoteStorageError::Conflict(conflict)) => {
                debug!(session = %key, "insert raced an existing draft; updating instead");
                match self.backend.find(&key).await? {
                    Some(existing) => {
                        self.update_existing(existing, session, default_email, now)
                            .await
                    }
                    None => Err(RemoteStorageError::Conflict(conflict)),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn update_existing(
        &self,
        existing: DraftRecord,
        session: &SurveySession,
        default_email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DraftRecord, RemoteStorageError> {
        if existing.status.is_completed() {
            return Err(RemoteStorageError::AlreadyCompleted {
                user_id: existing.user_id.to_string(),
                survey_key: existing.survey_key.to_string(),
            });
        }
        let record = self.build_record(existing.id, session, default_email, now);
        self.backend.update(&record).await?;
        Ok(record)
    }

    /// Flip the record for `key` to `completed`. Finalizing an already
    /// completed record returns it unchanged.
    pub async fn finalize(
        &self,
        key: &SessionKey,
        completed_at: DateTime<Utc>,
    ) -> Result<DraftRecord, RemoteStorageError> {
        let mut record = self.backend.find(key).await?.ok_or_else(|| {
            RemoteStorageError::NotFound {
                user_id: key.user_id.to_string(),
                survey_key: key.survey_key.to_string(),
            }
        })?;
        if record.status.is_completed() {
            return Ok(record);
        }
        record.status = SessionStatus::Completed;
        record.completed_at = Some(completed_at);
        record.updated_at = completed_at;
        self.backend.update(&record).await?;
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Record shape
    // -----------------------------------------------------------------------

    /// Build the draft row for `session`, filling every non-null identity
    /// column from the form, then the identity provider, then placeholders.
    pub fn build_record(
        &self,
        id: Uuid,
        session: &SurveySession,
        default_email: Option<&str>,
        now: DateTime<Utc>,
    ) -> DraftRecord {
        let layout = self.columns_for(&session.survey_key);
        let email = text_field(&session.fields, &layout.email_field)
            .or(default_email.filter(|e| !e.trim().is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| placeholder_email(session.user_id.as_str()));

        let columns: BTreeMap<String, String> = layout
            .placeholder_fields
            .iter()
            .map(|name| {
                let value = text_field(&session.fields, name)
                    .unwrap_or(layout.placeholder_value.as_str())
                    .to_string();
                (name.clone(), value)
            })
            .collect();

        DraftRecord {
            id,
            user_id: session.user_id.clone(),
            survey_key: session.survey_key.clone(),
            status: SessionStatus::Draft,
            section_index: session.current_section,
            scroll_offset: session.scroll_offset,
            email,
            columns,
            fields: session.fields.clone(),
            updated_at: now,
            completed_at: None,
        }
    }
}

fn text_field<'a>(fields: &'a FieldMap, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .and_then(|v| v.as_text())
        .filter(|s| !s.trim().is_empty())
}
