//! Consistency rules for "Other" free-text answers.
//!
//! A question `<x>` may carry a free-text companion `<x>_other` (plus optional
//! `<x>_other_*` extras such as a description or a rank). The companion is
//! only meaningful while it is unlocked:
//!
//! - if a flag `<x>_other_enabled` / `<x>_other_selected` exists, the flag
//!   decides; turning it off also drops the `"Other"` token from `<x>`;
//! - otherwise `<x>` must select the literal option `"Other"`.
//!
//! A locked companion is removed from the map. A question with neither a
//! flag nor a controller value leaves its companion alone, since nothing
//! says it is locked.

use crate::types::{FieldMap, FieldValue, OTHER_OPTION};

const OTHER_SUFFIX: &str = "_other";
const FLAG_SUFFIXES: [&str; 2] = ["_other_enabled", "_other_selected"];

/// Name of the question that owns `name` in the "Other" pattern, if any.
///
/// `"sectors_other"`, `"sectors_other_enabled"` and
/// `"sectors_other_description"` all belong to `"sectors"`. A plain name is
/// its own owner.
pub fn owner_of(name: &str) -> &str {
    for suffix in FLAG_SUFFIXES {
        if let Some(base) = name.strip_suffix(suffix) {
            return base;
        }
    }
    if let Some(base) = name.strip_suffix(OTHER_SUFFIX) {
        return base;
    }
    if let Some(idx) = name.rfind("_other_") {
        return &name[..idx];
    }
    name
}

fn is_flag_of(name: &str, base: &str) -> bool {
    FLAG_SUFFIXES
        .iter()
        .any(|s| name.len() == base.len() + s.len() && name.starts_with(base) && name.ends_with(s))
}

fn flag_state(fields: &FieldMap, base: &str) -> Option<bool> {
    FLAG_SUFFIXES
        .iter()
        .filter_map(|s| fields.get(&format!("{base}{s}")))
        .find_map(FieldValue::as_flag)
}

/// Re-establish the "Other" rules for the question touched by a write to
/// `written`. `removed` says whether that write deleted the field.
///
/// Returns the names of every field this call removed or rewrote, in
/// addition to `written` itself.
pub fn enforce(fields: &mut FieldMap, written: &str, removed: bool) -> Vec<String> {
    let base = owner_of(written).to_string();
    let controller_cleared = removed && written == base;

    let (unlocked, drop_token) = match flag_state(fields, &base) {
        Some(enabled) => (enabled, !enabled),
        None => match fields.get(&base) {
            Some(value) => (value.selects(OTHER_OPTION), false),
            None => (!controller_cleared, false),
        },
    };
    if unlocked {
        return Vec::new();
    }

    let mut touched = Vec::new();

    let free_text = format!("{base}{OTHER_SUFFIX}");
    let extras_prefix = format!("{free_text}_");
    let companions: Vec<String> = fields
        .keys()
        .filter(|k| **k == free_text || (k.starts_with(&extras_prefix) && !is_flag_of(k, &base)))
        .cloned()
        .collect();
    for name in companions {
        fields.remove(&name);
        if name != written {
            touched.push(name);
        }
    }

    if drop_token {
        if let Some(owner) = fields.get_mut(&base) {
            if owner.deselect(OTHER_OPTION) && base != written {
                touched.push(base);
            }
        }
    }

    touched
}
