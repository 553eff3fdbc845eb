//! SaveStatusMachine: the `idle | saving | saved | error` indicator.
//!
//! Legal transitions:
//!
//! ```text
//! idle  ─┐
//! saved ─┼─▶ saving ─▶ saved | error
//! error ─┘
//! saved | error ─▶ idle   (optional reset timer)
//! ```
//!
//! Illegal requests are ignored and reported as `false`. The current value
//! is published through a `tokio::sync::watch` channel and every transition
//! is also emitted synchronously as a [`StatusTransition`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::config::StatusResetDelays;
use crate::reactive::{EventEmitter, StatusTransition, Unsubscribe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaveStatus::Idle => "idle",
            SaveStatus::Saving => "saving",
            SaveStatus::Saved => "saved",
            SaveStatus::Error => "error",
        };
        f.write_str(s)
    }
}

struct StatusInner {
    tx: watch::Sender<SaveStatus>,
    transitions: Arc<EventEmitter<StatusTransition>>,
    reset: Option<StatusResetDelays>,
    /// Bumped on every transition; a reset timer only fires if nothing
    /// happened since it was armed.
    generation: AtomicU64,
}

#[derive(Clone)]
pub struct SaveStatusMachine {
    inner: Arc<StatusInner>,
}

impl SaveStatusMachine {
    pub fn new(reset: Option<StatusResetDelays>) -> Self {
        let (tx, _rx) = watch::channel(SaveStatus::Idle);
        Self {
            inner: Arc::new(StatusInner {
                tx,
                transitions: Arc::new(EventEmitter::new()),
                reset,
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn status(&self) -> SaveStatus {
        *self.inner.tx.borrow()
    }

    /// A receiver that observes every published status value.
    pub fn watch(&self) -> watch::Receiver<SaveStatus> {
        self.inner.tx.subscribe()
    }

    /// Observe each transition synchronously.
    pub fn on_transition(
        &self,
        callback: impl Fn(&StatusTransition) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.inner.transitions.subscribe(callback)
    }

    /// Enter `saving`. Must happen before the remote call starts.
    pub fn begin_save(&self) -> bool {
        self.transition(
            |s| matches!(s, SaveStatus::Idle | SaveStatus::Saved | SaveStatus::Error),
            SaveStatus::Saving,
        )
    }

    /// Leave `saving` for `saved`.
    pub fn succeed(&self) -> bool {
        let ok = self.transition(|s| s == SaveStatus::Saving, SaveStatus::Saved);
        if ok {
            if let Some(reset) = self.inner.reset {
                self.arm_reset(reset.saved());
            }
        }
        ok
    }

    /// Leave `saving` for `error`.
    pub fn fail(&self) -> bool {
        let ok = self.transition(|s| s == SaveStatus::Saving, SaveStatus::Error);
        if ok {
            if let Some(reset) = self.inner.reset {
                self.arm_reset(reset.error());
            }
        }
        ok
    }

    /// Return from `saved` or `error` to `idle`.
    pub fn reset(&self) -> bool {
        self.transition(
            |s| matches!(s, SaveStatus::Saved | SaveStatus::Error),
            SaveStatus::Idle,
        )
    }

    fn transition(&self, allowed: impl Fn(SaveStatus) -> bool, to: SaveStatus) -> bool {
        let mut from = None;
        self.inner.tx.send_if_modified(|current| {
            if allowed(*current) {
                from = Some(*current);
                *current = to;
                true
            } else {
                false
            }
        });
        match from {
            Some(from) => {
                self.inner.generation.fetch_add(1, Ordering::SeqCst);
                self.inner.transitions.emit(&StatusTransition { from, to });
                true
            }
            None => {
                debug!(
                    to = %to,
                    current = %self.status(),
                    "ignored illegal save status transition"
                );
                false
            }
        }
    }

    fn arm_reset(&self, delay: std::time::Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime; save status reset timer not armed");
            return;
        };
        let armed_at = self.inner.generation.load(Ordering::SeqCst);
        let machine = self.clone();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if machine.inner.generation.load(Ordering::SeqCst) == armed_at {
                machine.reset();
            }
        });
    }
}

impl Default for SaveStatusMachine {
    fn default() -> Self {
        Self::new(None)
    }
}
