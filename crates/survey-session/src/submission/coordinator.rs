//! SubmissionCoordinator: the one-way draft → completed transition.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{RemoteStorageError, Result, SubmissionError, SubmissionStage};
use crate::storage::{LocalSnapshotStore, RemoteDraftStore};
use crate::types::{DraftRecord, SurveySession};

use super::validator::SchemaValidator;

pub struct SubmissionCoordinator {
    validator: Arc<dyn SchemaValidator>,
    remote: Arc<RemoteDraftStore>,
    local: Arc<LocalSnapshotStore>,
}

impl SubmissionCoordinator {
    pub fn new(
        validator: Arc<dyn SchemaValidator>,
        remote: Arc<RemoteDraftStore>,
        local: Arc<LocalSnapshotStore>,
    ) -> Self {
        Self {
            validator,
            remote,
            local,
        }
    }

    /// Validate, write the full record, mark it completed and drop the local
    /// snapshot.
    ///
    /// Validation failures write nothing. A storage failure leaves the
    /// record a draft (or untouched) and the local snapshot in place, so the
    /// same call can simply be retried. A retry that finds the record
    /// already completed confirms it instead of failing.
    pub async fn submit(
        &self,
        session: &SurveySession,
        default_email: Option<&str>,
    ) -> Result<DraftRecord> {
        let key = session.key();

        self.validator.validate(&session.fields)?;

        match self.remote.upsert_draft(session, default_email).await {
            Ok(_) => {}
            // An earlier finalize committed but its reply never arrived.
            Err(RemoteStorageError::AlreadyCompleted { .. }) => {
                info!(session = %key, "record already completed; confirming submission");
            }
            Err(source) => {
                warn!(session = %key, error = %source, "submission upsert failed");
                return Err(SubmissionError {
                    stage: SubmissionStage::Upsert,
                    source,
                }
                .into());
            }
        }

        let record = self
            .remote
            .finalize(&key, Utc::now())
            .await
            .map_err(|source| {
                warn!(session = %key, error = %source, "submission finalize failed");
                SubmissionError {
                    stage: SubmissionStage::Finalize,
                    source,
                }
            })?;

        self.local.clear(&key);
        info!(session = %key, "survey submitted");
        Ok(record)
    }
}
