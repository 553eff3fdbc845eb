use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Opaque identifier of the user owning a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Survey edition identifier (e.g. `"2024"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurveyKey(String);

impl SurveyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurveyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SurveyKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SurveyKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The (user, survey edition) pair that uniquely identifies a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: UserId,
    pub survey_key: SurveyKey,
}

impl SessionKey {
    pub fn new(user_id: impl Into<UserId>, survey_key: impl Into<SurveyKey>) -> Self {
        Self {
            user_id: user_id.into(),
            survey_key: survey_key.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.survey_key)
    }
}

// ============================================================================
// SessionStatus
// ============================================================================

/// Lifecycle status. Only `Draft → Completed` is ever taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Draft,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Draft => "draft",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SessionStatus::Completed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SessionStatus::Draft),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(format!("unknown session status \"{other}\"")),
        }
    }
}

// ============================================================================
// FieldValue
// ============================================================================

/// Literal option token that unlocks a paired free-text `<x>_other` field.
pub const OTHER_OPTION: &str = "Other";

/// Single answer value: free text or a yes/no flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Text(String),
}

/// Rank token per ranked item label.
pub type RankMap = BTreeMap<String, String>;

/// Two-level grouping of rank maps (per-aspect ratings).
pub type NestedRankMap = BTreeMap<String, RankMap>;

/// A typed survey answer.
///
/// Serialized adjacently tagged (`{"kind": ..., "value": ...}`) so that every
/// variant, including empty maps, survives a round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Scalar(ScalarValue),
    /// Multi-select answer with set semantics; insertion order is kept.
    List(Vec<String>),
    RankMap(RankMap),
    NestedMap(NestedRankMap),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Scalar(ScalarValue::Text(s.into()))
    }

    pub fn flag(b: bool) -> Self {
        FieldValue::Scalar(ScalarValue::Bool(b))
    }

    /// Build a list, dropping repeated entries (first occurrence wins).
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for item in items {
            let item = item.into();
            if !out.contains(&item) {
                out.push(item);
            }
        }
        FieldValue::List(out)
    }

    pub fn rank_map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        FieldValue::RankMap(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn nested_map(groups: NestedRankMap) -> Self {
        FieldValue::NestedMap(groups)
    }

    /// Re-establish list set semantics on values that did not come through a
    /// constructor (deserialized, hydrated).
    pub fn normalized(self) -> Self {
        match self {
            FieldValue::List(items) => FieldValue::list(items),
            other => other,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Scalar(_) => "scalar",
            FieldValue::List(_) => "list",
            FieldValue::RankMap(_) => "rank_map",
            FieldValue::NestedMap(_) => "nested_map",
        }
    }

    /// Empty text, empty collections. A flag is never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Scalar(ScalarValue::Text(s)) => s.trim().is_empty(),
            FieldValue::Scalar(ScalarValue::Bool(_)) => false,
            FieldValue::List(items) => items.is_empty(),
            FieldValue::RankMap(map) => map.is_empty(),
            FieldValue::NestedMap(map) => map.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(ScalarValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Scalar(ScalarValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_rank_map(&self) -> Option<&RankMap> {
        match self {
            FieldValue::RankMap(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_nested_map(&self) -> Option<&NestedRankMap> {
        match self {
            FieldValue::NestedMap(map) => Some(map),
            _ => None,
        }
    }

    /// Whether `option` is currently selected by this answer: the text equals
    /// it, the list holds it, or a rank/nested map has it as a key.
    pub fn selects(&self, option: &str) -> bool {
        match self {
            FieldValue::Scalar(ScalarValue::Text(s)) => s == option,
            FieldValue::Scalar(ScalarValue::Bool(_)) => false,
            FieldValue::List(items) => items.iter().any(|i| i == option),
            FieldValue::RankMap(map) => map.contains_key(option),
            FieldValue::NestedMap(map) => map.contains_key(option),
        }
    }

    /// Drop `option` from a list or as a key of a rank/nested map. Returns
    /// `true` if anything was removed. Scalars are left as they are.
    pub fn deselect(&mut self, option: &str) -> bool {
        match self {
            FieldValue::List(items) => {
                let before = items.len();
                items.retain(|i| i != option);
                items.len() != before
            }
            FieldValue::RankMap(map) => map.remove(option).is_some(),
            FieldValue::NestedMap(map) => map.remove(option).is_some(),
            FieldValue::Scalar(_) => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::text(s)
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::flag(b)
    }
}

/// Field name → answer. Ordered so serialized snapshots are deterministic.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Normalize every value in a map (see [`FieldValue::normalized`]).
pub fn normalize_fields(fields: FieldMap) -> FieldMap {
    fields
        .into_iter()
        .map(|(name, value)| (name, value.normalized()))
        .collect()
}

// ============================================================================
// Position
// ============================================================================

/// Section index (1-based) and advisory scroll offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPosition {
    pub section: u32,
    pub scroll_offset: u64,
}

impl Default for SectionPosition {
    fn default() -> Self {
        Self {
            section: 1,
            scroll_offset: 0,
        }
    }
}

// ============================================================================
// SurveySession
// ============================================================================

/// Full state of one (user, survey) questionnaire session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveySession {
    pub user_id: UserId,
    pub survey_key: SurveyKey,
    pub status: SessionStatus,
    pub current_section: u32,
    pub scroll_offset: u64,
    pub fields: FieldMap,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SurveySession {
    /// A fresh draft: section 1, no answers, never saved.
    pub fn new(key: SessionKey) -> Self {
        Self {
            user_id: key.user_id,
            survey_key: key.survey_key,
            status: SessionStatus::Draft,
            current_section: 1,
            scroll_offset: 0,
            fields: FieldMap::new(),
            last_saved_at: None,
            completed_at: None,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey {
            user_id: self.user_id.clone(),
            survey_key: self.survey_key.clone(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    pub fn position(&self) -> SectionPosition {
        SectionPosition {
            section: self.current_section,
            scroll_offset: self.scroll_offset,
        }
    }
}

// ============================================================================
// Persisted shapes
// ============================================================================

/// Row kept by the remote draft store. At most one per (user, survey).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub survey_key: SurveyKey,
    pub status: SessionStatus,
    pub section_index: u32,
    pub scroll_offset: u64,
    /// Non-null identity column; placeholder-filled on drafts.
    pub email: String,
    /// Other non-null identity columns, placeholder-filled on drafts.
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
    pub fields: FieldMap,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl DraftRecord {
    pub fn key(&self) -> SessionKey {
        SessionKey {
            user_id: self.user_id.clone(),
            survey_key: self.survey_key.clone(),
        }
    }

    pub fn into_session(self) -> SurveySession {
        SurveySession {
            user_id: self.user_id,
            survey_key: self.survey_key,
            status: self.status,
            current_section: self.section_index,
            scroll_offset: self.scroll_offset,
            fields: normalize_fields(self.fields),
            last_saved_at: Some(self.updated_at),
            completed_at: self.completed_at,
        }
    }
}

/// Field map cached on this device, with the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalFields {
    pub fields: FieldMap,
    pub saved_at: DateTime<Utc>,
}

/// Everything the local snapshot cache holds for one session. Either half may
/// be missing: position is written on navigation, fields on autosave.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalSnapshot {
    pub position: Option<SectionPosition>,
    pub fields: Option<LocalFields>,
}

impl LocalSnapshot {
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.fields.is_none()
    }
}

/// Runtime lifecycle facts shared by the autosave and submission paths.
#[derive(Debug, Clone, Default)]
pub struct SessionMeta {
    pub status: SessionStatus,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Field-store revision of the last snapshot the remote store accepted.
    pub saved_revision: Option<u64>,
}
