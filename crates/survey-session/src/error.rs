use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ValidationError / ValidationErrors
// ---------------------------------------------------------------------------

/// A single field-level validation failure reported by a schema validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r#"Field "{}" is invalid: {}"#, self.field, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// A collection of one or more `ValidationError`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    /// Names of the offending fields, in report order.
    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.field.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed:")?;
        for e in &self.0 {
            write!(f, "\n  - {}: {}", e.field, e.reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// ---------------------------------------------------------------------------
// LocalStorageError
// ---------------------------------------------------------------------------

/// Failure of the same-device snapshot cache. Never surfaced past
/// `LocalSnapshotStore`; it is logged and the operation degrades.
#[derive(Debug, Error)]
pub enum LocalStorageError {
    #[error("Local snapshot I/O failed for \"{key}\"")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Local snapshot \"{key}\" could not be (de)serialized")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Local snapshot storage unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// ConflictError
// ---------------------------------------------------------------------------

/// An insert hit an existing record for the same (user, survey) identity.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Draft record already exists for user \"{user_id}\" and survey \"{survey_key}\"")]
pub struct ConflictError {
    pub user_id: String,
    pub survey_key: String,
}

// ---------------------------------------------------------------------------
// RemoteStorageError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RemoteStorageError {
    #[error("Remote draft store unreachable: {0}")]
    Transport(String),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("No draft record for user \"{user_id}\" and survey \"{survey_key}\"")]
    NotFound { user_id: String, survey_key: String },

    #[error(
        "Survey \"{survey_key}\" for user \"{user_id}\" is already completed and can no longer be changed"
    )]
    AlreadyCompleted { user_id: String, survey_key: String },

    #[error("Draft record could not be (de)serialized")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl RemoteStorageError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

// ---------------------------------------------------------------------------
// SubmissionError
// ---------------------------------------------------------------------------

/// Which write of the submission sequence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    /// Writing the full record (lookup-then-insert/update).
    Upsert,
    /// Flipping the record to `completed`.
    Finalize,
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStage::Upsert => write!(f, "upsert"),
            SubmissionStage::Finalize => write!(f, "finalize"),
        }
    }
}

#[derive(Debug, Error)]
#[error("Submission failed during {stage}; the draft is kept and can be resubmitted")]
pub struct SubmissionError {
    pub stage: SubmissionStage,
    #[source]
    pub source: RemoteStorageError,
}

// ---------------------------------------------------------------------------
// SurveyError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SurveyError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    LocalStorage(#[from] LocalStorageError),

    #[error(transparent)]
    RemoteStorage(#[from] RemoteStorageError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Survey \"{survey_key}\" for user \"{user_id}\" is completed and read-only")]
    ReadOnly { user_id: String, survey_key: String },

    #[error("Autosave scheduler has been shut down")]
    Disposed,
}

/// Result alias defaulting to `SurveyError`.
pub type Result<T, E = SurveyError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
