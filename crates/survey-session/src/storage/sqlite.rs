//! SQLite draft backend.
//!
//! One `survey_drafts` row per record. The (user_id, survey_key) index is
//! deliberately not unique: inserts check for an existing row inside a
//! transaction and report a conflict themselves.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::error::{ConflictError, RemoteStorageError};
use crate::types::{DraftRecord, SessionKey};

use super::traits::DraftBackend;

const COLUMNS: &str = "id, user_id, survey_key, status, section_index, scroll_offset, \
                       email, columns, fields, updated_at, completed_at";

pub struct SqliteDraftBackend {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteDraftBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RemoteStorageError> {
        let conn = rusqlite::Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, RemoteStorageError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Self, RemoteStorageError> {
        conn.execute_batch(
            "PRAGMA busy_timeout=5000;
             CREATE TABLE IF NOT EXISTS survey_drafts (
                 id             TEXT PRIMARY KEY,
                 user_id        TEXT NOT NULL,
                 survey_key     TEXT NOT NULL,
                 status         TEXT NOT NULL,
                 section_index  INTEGER NOT NULL,
                 scroll_offset  INTEGER NOT NULL DEFAULT 0,
                 email          TEXT NOT NULL,
                 columns        TEXT NOT NULL DEFAULT '{}',
                 fields         TEXT NOT NULL DEFAULT '{}',
                 updated_at     TEXT NOT NULL,
                 completed_at   TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_survey_drafts_owner
                 ON survey_drafts (user_id, survey_key);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of rows stored for `key`.
    pub fn count(&self, key: &SessionKey) -> Result<usize, RemoteStorageError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM survey_drafts WHERE user_id = ?1 AND survey_key = ?2",
            params![key.user_id.as_str(), key.survey_key.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DraftRecord> {
        let id: String = row.get(0)?;
        let user_id: String = row.get(1)?;
        let survey_key: String = row.get(2)?;
        let status: String = row.get(3)?;
        let section_index: u32 = row.get(4)?;
        let scroll_offset: i64 = row.get(5)?;
        let email: String = row.get(6)?;
        let columns: String = row.get(7)?;
        let fields: String = row.get(8)?;
        let updated_at: String = row.get(9)?;
        let completed_at: Option<String> = row.get(10)?;

        Ok(DraftRecord {
            id: Uuid::parse_str(&id).map_err(|e| conversion_err(0, e))?,
            user_id: user_id.into(),
            survey_key: survey_key.into(),
            status: status.parse().map_err(|e: String| conversion_err(3, e))?,
            section_index,
            scroll_offset: u64::try_from(scroll_offset).unwrap_or(0),
            email,
            columns: serde_json::from_str(&columns).map_err(|e| conversion_err(7, e))?,
            fields: serde_json::from_str(&fields).map_err(|e| conversion_err(8, e))?,
            updated_at: parse_time(9, &updated_at)?,
            completed_at: completed_at.map(|s| parse_time(10, &s)).transpose()?,
        })
    }
}

fn conversion_err(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

fn parse_time(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn clamp_offset(offset: u64) -> i64 {
    i64::try_from(offset).unwrap_or(i64::MAX)
}

#[async_trait]
impl DraftBackend for SqliteDraftBackend {
    async fn find(&self, key: &SessionKey) -> Result<Option<DraftRecord>, RemoteStorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {COLUMNS} FROM survey_drafts \
             WHERE user_id = ?1 AND survey_key = ?2 \
             ORDER BY updated_at DESC LIMIT 1"
        ))?;
        let record = stmt
            .query_row(
                params![key.user_id.as_str(), key.survey_key.as_str()],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    async fn insert(&self, record: &DraftRecord) -> Result<(), RemoteStorageError> {
        let columns = serde_json::to_string(&record.columns)?;
        let fields = serde_json::to_string(&record.fields)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM survey_drafts WHERE user_id = ?1 AND survey_key = ?2",
                params![record.user_id.as_str(), record.survey_key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(ConflictError {
                user_id: record.user_id.to_string(),
                survey_key: record.survey_key.to_string(),
            }
            .into());
        }
        tx.execute(
            &format!(
                "INSERT INTO survey_drafts ({COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                record.id.to_string(),
                record.user_id.as_str(),
                record.survey_key.as_str(),
                record.status.as_str(),
                record.section_index,
                clamp_offset(record.scroll_offset),
                record.email,
                columns,
                fields,
                record.updated_at.to_rfc3339(),
                record.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn update(&self, record: &DraftRecord) -> Result<(), RemoteStorageError> {
        let columns = serde_json::to_string(&record.columns)?;
        let fields = serde_json::to_string(&record.fields)?;

        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE survey_drafts SET status = ?2, section_index = ?3, scroll_offset = ?4, \
             email = ?5, columns = ?6, fields = ?7, updated_at = ?8, completed_at = ?9 \
             WHERE id = ?1",
            params![
                record.id.to_string(),
                record.status.as_str(),
                record.section_index,
                clamp_offset(record.scroll_offset),
                record.email,
                columns,
                fields,
                record.updated_at.to_rfc3339(),
                record.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        if changed == 0 {
            return Err(RemoteStorageError::NotFound {
                user_id: record.user_id.to_string(),
                survey_key: record.survey_key.to_string(),
            });
        }
        Ok(())
    }
}
