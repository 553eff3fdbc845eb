//! Session configuration.
//!
//! Every knob is optional; `None` resolves to the documented default through
//! the accessor methods, so a config document only names what it changes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_TOTAL_SECTIONS: u32 = 7;
const DEFAULT_DEBOUNCE_MS: u64 = 2000;
const DEFAULT_LOCAL_KEY_PREFIX: &str = "survey";

// ============================================================================
// SessionOptions
// ============================================================================

/// Configuration for [`SessionManager`](crate::session::SessionManager).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Number of sections in the questionnaire (default: 7, minimum 1).
    pub total_sections: Option<u32>,
    /// Quiet period before an autosave fires (default: 2000).
    pub debounce_ms: Option<u64>,
    /// When set, `saved`/`error` fall back to `idle` after these delays.
    pub status_reset: Option<StatusResetDelays>,
    /// How draft rows satisfy non-null identity columns, for any edition
    /// without an entry in `draft_columns_by_survey`.
    pub draft_columns: DraftColumns,
    /// Per-edition column sets keyed by survey key (default:
    /// [`DraftColumns::known_editions`]). A configured map replaces the
    /// defaults entirely.
    pub draft_columns_by_survey: Option<BTreeMap<String, DraftColumns>>,
    /// Prefix for local snapshot keys (default: `"survey"`).
    pub local_key_prefix: Option<String>,
}

impl SessionOptions {
    /// Parse options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn total_sections(&self) -> u32 {
        self.total_sections.unwrap_or(DEFAULT_TOTAL_SECTIONS).max(1)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS))
    }

    pub fn draft_columns_by_survey(&self) -> BTreeMap<String, DraftColumns> {
        self.draft_columns_by_survey
            .clone()
            .unwrap_or_else(DraftColumns::known_editions)
    }

    pub fn local_key_prefix(&self) -> &str {
        self.local_key_prefix
            .as_deref()
            .unwrap_or(DEFAULT_LOCAL_KEY_PREFIX)
    }
}

// ============================================================================
// StatusResetDelays
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusResetDelays {
    pub saved_ms: u64,
    pub error_ms: u64,
}

impl Default for StatusResetDelays {
    fn default() -> Self {
        Self {
            saved_ms: 2000,
            error_ms: 3000,
        }
    }
}

impl StatusResetDelays {
    pub fn saved(&self) -> Duration {
        Duration::from_millis(self.saved_ms)
    }

    pub fn error(&self) -> Duration {
        Duration::from_millis(self.error_ms)
    }
}

// ============================================================================
// DraftColumns
// ============================================================================

/// Identity columns a draft row must carry before the user has filled them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftColumns {
    /// Form field holding the respondent's email.
    pub email_field: String,
    /// Form fields copied into non-null columns, placeholder-filled when blank.
    pub placeholder_fields: Vec<String>,
    pub placeholder_value: String,
}

impl Default for DraftColumns {
    fn default() -> Self {
        Self {
            email_field: "email_address".to_string(),
            placeholder_fields: vec![
                "organisation_name".to_string(),
                "funds_raising_investing".to_string(),
                "fund_name".to_string(),
            ],
            placeholder_value: "Draft".to_string(),
        }
    }
}

impl DraftColumns {
    pub fn new<I, S>(email_field: impl Into<String>, placeholder_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            email_field: email_field.into(),
            placeholder_fields: placeholder_fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Column sets of the editions run so far. 2022 names its email column
    /// `email`; the others use `email_address`.
    pub fn known_editions() -> BTreeMap<String, DraftColumns> {
        let current = || {
            DraftColumns::new(
                "email_address",
                ["organisation_name", "funds_raising_investing", "fund_name"],
            )
        };
        BTreeMap::from([
            (
                "2021".to_string(),
                DraftColumns::new(
                    "email_address",
                    ["firm_name", "participant_name", "role_title"],
                ),
            ),
            (
                "2022".to_string(),
                DraftColumns::new("email", ["name", "role_title", "organisation"]),
            ),
            ("2023".to_string(), current()),
            ("2024".to_string(), current()),
        ])
    }
}

/// Email stored on a draft row when neither the form nor the identity
/// provider supplies one.
pub fn placeholder_email(user_id: &str) -> String {
    format!("draft+{user_id}@placeholder.local")
}
