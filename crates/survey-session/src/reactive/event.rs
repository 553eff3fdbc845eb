//! Events published by editing sessions and the completion index.

use std::collections::BTreeSet;

use crate::autosave::SaveStatus;
use crate::types::{SurveyKey, UserId};

/// A field was written (or removed) in the field store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub name: String,
    /// Store revision after the write.
    pub revision: u64,
    /// `true` when the write removed the field.
    pub removed: bool,
}

/// The save status indicator moved from one state to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: SaveStatus,
    pub to: SaveStatus,
}

/// A fresh completion lookup for `user_id` differs from the last known one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionChange {
    pub user_id: UserId,
    pub completed: BTreeSet<SurveyKey>,
}
