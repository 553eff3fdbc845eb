//! Schema validation seam used at submit time.
//!
//! Per-edition question schemas live outside this crate; they plug in through
//! [`SchemaValidator`]. [`RequiredFieldsValidator`] covers the common case of
//! "these answers must be present" plus email format checks.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ValidationError, ValidationErrors};
use crate::types::FieldMap;

pub trait SchemaValidator: Send + Sync {
    /// `Ok(())` when `fields` may be submitted, otherwise every offending
    /// field with a reason.
    fn validate(&self, fields: &FieldMap) -> Result<(), ValidationErrors>;
}

impl<F> SchemaValidator for F
where
    F: Fn(&FieldMap) -> Result<(), ValidationErrors> + Send + Sync,
{
    fn validate(&self, fields: &FieldMap) -> Result<(), ValidationErrors> {
        self(fields)
    }
}

// ============================================================================
// RequiredFieldsValidator
// ============================================================================

/// Compiled once at first use.
fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid")
    })
}

#[derive(Debug, Clone, Default)]
pub struct RequiredFieldsValidator {
    required: Vec<String>,
    email_fields: Vec<String>,
}

impl RequiredFieldsValidator {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            email_fields: Vec::new(),
        }
    }

    /// Also require `name`, when present, to look like an email address.
    pub fn with_email_field(mut self, name: impl Into<String>) -> Self {
        self.email_fields.push(name.into());
        self
    }
}

impl SchemaValidator for RequiredFieldsValidator {
    fn validate(&self, fields: &FieldMap) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();

        for name in &self.required {
            match fields.get(name) {
                Some(v) if !v.is_empty() => {}
                _ => errors.push(ValidationError::new(name.as_str(), "required")),
            }
        }

        for name in &self.email_fields {
            let Some(value) = fields.get(name) else {
                continue;
            };
            match value.as_text() {
                Some(s) if s.trim().is_empty() => {}
                Some(s) if email_regex().is_match(s.trim()) => {}
                _ => errors.push(ValidationError::new(name.as_str(), "not an email address")),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }
}
