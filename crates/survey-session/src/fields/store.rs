//! FieldStore: the in-memory answer map of one editing session.
//!
//! Every effective write bumps a monotonically increasing revision and marks
//! the written field dirty at that revision. Autosave snapshots carry the
//! revision they were taken at, so a successful save can clear exactly the
//! dirty flags it covered and leave later edits pending.
//!
//! The store never touches storage. Subscribers are notified synchronously
//! after the internal lock is released.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, SurveyError};
use crate::reactive::{EventEmitter, FieldChange, Unsubscribe};
use crate::types::{normalize_fields, FieldMap, FieldValue, RankMap, SessionKey};

use super::other;

struct StoreState {
    fields: FieldMap,
    /// Field name → revision of its latest unsaved write.
    dirty: BTreeMap<String, u64>,
    revision: u64,
    frozen: bool,
}

pub struct FieldStore {
    key: SessionKey,
    state: Mutex<StoreState>,
    changes: Arc<EventEmitter<FieldChange>>,
}

impl FieldStore {
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            state: Mutex::new(StoreState {
                fields: FieldMap::new(),
                dirty: BTreeMap::new(),
                revision: 0,
                frozen: false,
            }),
            changes: Arc::new(EventEmitter::new()),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.state.lock().fields.get(name).cloned()
    }

    /// Deep copy of every field.
    pub fn snapshot(&self) -> FieldMap {
        self.state.lock().fields.clone()
    }

    /// Deep copy of every field together with the revision it reflects.
    pub fn snapshot_at_revision(&self) -> (FieldMap, u64) {
        let st = self.state.lock();
        (st.fields.clone(), st.revision)
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    pub fn len(&self) -> usize {
        self.state.lock().fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().fields.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        !self.state.lock().dirty.is_empty()
    }

    pub fn dirty_fields(&self) -> Vec<String> {
        self.state.lock().dirty.keys().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Write `value` under `name`, then re-apply the "Other" rules for the
    /// owning question. Returns `Ok(false)` when nothing changed (same value
    /// already stored); no revision bump and no notification in that case.
    pub fn set(&self, name: &str, value: impl Into<FieldValue>) -> Result<bool> {
        let value = value.into().normalized();
        self.write(name, Some(value))
    }

    /// Remove `name`. Removing an absent field is a no-op.
    pub fn remove(&self, name: &str) -> Result<bool> {
        self.write(name, None)
    }

    /// Set (`Some`) or clear (`None`) the rank of one item inside the rank map
    /// `name`, creating the map on first use. A field of another kind is
    /// replaced by a fresh rank map.
    pub fn set_rank(&self, name: &str, item: &str, rank: Option<&str>) -> Result<bool> {
        let mut ranks: RankMap = self
            .get(name)
            .and_then(|v| v.as_rank_map().cloned())
            .unwrap_or_default();
        match rank {
            Some(r) => {
                ranks.insert(item.to_string(), r.to_string());
            }
            None => {
                ranks.remove(item);
            }
        }
        self.write(name, Some(FieldValue::RankMap(ranks)))
    }

    fn write(&self, name: &str, value: Option<FieldValue>) -> Result<bool> {
        let events = {
            let mut st = self.state.lock();
            if st.frozen {
                debug!(session = %self.key, field = name, "rejected write to completed session");
                return Err(SurveyError::ReadOnly {
                    user_id: self.key.user_id.to_string(),
                    survey_key: self.key.survey_key.to_string(),
                });
            }

            let removed = value.is_none();
            let before = st.fields.get(name).cloned();
            match value {
                Some(v) => {
                    if before.as_ref() == Some(&v) {
                        return Ok(false);
                    }
                    st.fields.insert(name.to_string(), v);
                }
                None => {
                    if before.is_none() {
                        return Ok(false);
                    }
                    st.fields.remove(name);
                }
            }

            let mut touched = other::enforce(&mut st.fields, name, removed);
            // A locked `<x>_other` write is dropped again by `enforce`.
            let changed = st.fields.get(name) != before.as_ref();
            if !changed && touched.is_empty() {
                return Ok(false);
            }

            st.revision += 1;
            let revision = st.revision;
            let mut names = Vec::with_capacity(touched.len() + 1);
            if changed {
                names.push(name.to_string());
            }
            names.append(&mut touched);

            names
                .into_iter()
                .map(|n| {
                    st.dirty.insert(n.clone(), revision);
                    let removed = !st.fields.contains_key(&n);
                    FieldChange {
                        name: n,
                        revision,
                        removed,
                    }
                })
                .collect::<Vec<_>>()
        };

        for event in &events {
            self.changes.emit(event);
        }
        Ok(true)
    }

    /// Replace every field with `fields` without marking anything dirty and
    /// without notifying subscribers. Used when restoring a session on mount.
    pub fn hydrate(&self, fields: FieldMap) {
        let mut st = self.state.lock();
        st.fields = normalize_fields(fields);
        st.dirty.clear();
    }

    /// Clear dirty flags whose latest write is at or below `revision`.
    pub fn clear_dirty_through(&self, revision: u64) {
        self.state.lock().dirty.retain(|_, rev| *rev > revision);
    }

    /// Reject every later write with [`SurveyError::ReadOnly`].
    pub fn freeze(&self) {
        self.state.lock().frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.state.lock().frozen
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Observe every effective field write. The returned closure detaches the
    /// listener.
    pub fn subscribe(
        &self,
        callback: impl Fn(&FieldChange) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.changes.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.size()
    }
}
