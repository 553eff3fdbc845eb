//! SectionNavigator: current section and scroll offset of a session.
//!
//! Position is local-only state: every change is written through
//! [`LocalSnapshotStore::write_position`] and never sent to the remote store
//! directly (autosave carries it along with the fields).

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::storage::LocalSnapshotStore;
use crate::types::{SectionPosition, SessionKey};

struct NavState {
    position: SectionPosition,
    frozen: bool,
}

pub struct SectionNavigator {
    key: SessionKey,
    total_sections: u32,
    local: Arc<LocalSnapshotStore>,
    state: Mutex<NavState>,
}

impl SectionNavigator {
    /// Start at `initial`, clamped into `1..=total_sections`.
    pub fn new(
        key: SessionKey,
        total_sections: u32,
        local: Arc<LocalSnapshotStore>,
        initial: SectionPosition,
    ) -> Self {
        let total_sections = total_sections.max(1);
        let position = SectionPosition {
            section: initial.section.clamp(1, total_sections),
            scroll_offset: initial.scroll_offset,
        };
        Self {
            key,
            total_sections,
            local,
            state: Mutex::new(NavState {
                position,
                frozen: false,
            }),
        }
    }

    /// Pick the starting position on mount: a local position past the first
    /// section wins, then the section stored on the remote record, then 1.
    pub fn restore(
        key: SessionKey,
        total_sections: u32,
        local: Arc<LocalSnapshotStore>,
        local_position: Option<SectionPosition>,
        remote_position: Option<SectionPosition>,
    ) -> Self {
        let initial = local_position
            .filter(|p| p.section > 1)
            .or(remote_position.filter(|p| p.section >= 1))
            .unwrap_or_default();
        Self::new(key, total_sections, local, initial)
    }

    pub fn total_sections(&self) -> u32 {
        self.total_sections
    }

    pub fn current(&self) -> u32 {
        self.state.lock().position.section
    }

    pub fn position(&self) -> SectionPosition {
        self.state.lock().position
    }

    /// Move to section `n`. Out-of-range targets leave the position unchanged.
    /// Returns `true` if the section changed; the scroll offset then starts
    /// again at 0 and the new position is persisted locally.
    pub fn go_to(&self, n: u32) -> bool {
        if n < 1 || n > self.total_sections {
            debug!(
                session = %self.key,
                section = n,
                total = self.total_sections,
                "ignored out-of-range navigation"
            );
            return false;
        }
        let position = {
            let mut st = self.state.lock();
            if st.frozen || st.position.section == n {
                return false;
            }
            st.position = SectionPosition {
                section: n,
                scroll_offset: 0,
            };
            st.position
        };
        self.local.write_position(&self.key, position);
        true
    }

    pub fn next(&self) -> bool {
        self.go_to(self.current().saturating_add(1))
    }

    pub fn previous(&self) -> bool {
        self.go_to(self.current().saturating_sub(1))
    }

    /// Record the scroll offset within the current section.
    pub fn set_scroll_offset(&self, offset: u64) {
        let position = {
            let mut st = self.state.lock();
            if st.frozen || st.position.scroll_offset == offset {
                return;
            }
            st.position.scroll_offset = offset;
            st.position
        };
        self.local.write_position(&self.key, position);
    }

    /// Stop accepting navigation (completed sessions).
    pub fn freeze(&self) {
        self.state.lock().frozen = true;
    }
}
