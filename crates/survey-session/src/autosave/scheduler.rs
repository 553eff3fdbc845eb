//! AutosaveScheduler: debounce layer over a [`SaveTarget`].
//!
//! A background task owns the debounce deadline. Every field change pushes
//! the deadline out by the debounce period; when it passes, the target runs
//! once. The save is awaited inside the task, so cycles are strictly
//! serialized: a change that arrives mid-save arms a new deadline that starts
//! counting after the save settles.
//!
//! Cancelling (or shutting down) only drops the pending deadline. A save that
//! is already running is left to finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Result, SurveyError};

use super::cycle::SaveOutcome;

/// Something that can persist the current state of a session.
#[async_trait]
pub trait SaveTarget: Send + Sync {
    async fn save(&self) -> SaveOutcome;
}

enum Command {
    Changed,
    Flush(oneshot::Sender<SaveOutcome>),
    Cancel,
    Shutdown,
}

pub struct AutosaveScheduler {
    tx: mpsc::UnboundedSender<Command>,
    pending: Arc<AtomicBool>,
    disposed: AtomicBool,
    debounce: Duration,
}

impl AutosaveScheduler {
    /// Start the scheduler task on the current tokio runtime.
    pub fn spawn(target: Arc<dyn SaveTarget>, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicBool::new(false));
        tokio::spawn(run(rx, target, debounce, Arc::clone(&pending)));
        Self {
            tx,
            pending,
            disposed: AtomicBool::new(false),
            debounce,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Restart the debounce timer.
    pub fn on_field_change(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        // Mark pending here rather than in the task so callers see it
        // immediately after the change.
        self.pending.store(true, Ordering::SeqCst);
        let _ = self.tx.send(Command::Changed);
    }

    /// Drop any pending deadline and save right away, after any save that is
    /// already running.
    pub async fn flush(&self) -> Result<SaveOutcome> {
        self.check_disposed()?;
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(reply))
            .map_err(|_| SurveyError::Disposed)?;
        rx.await.map_err(|_| SurveyError::Disposed)
    }

    /// Drop the pending deadline, if any.
    pub fn cancel(&self) {
        self.pending.store(false, Ordering::SeqCst);
        let _ = self.tx.send(Command::Cancel);
    }

    /// Whether a debounced save is waiting for its quiet period.
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Stop the task. The pending deadline is dropped; an in-flight save
    /// still completes.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pending.store(false, Ordering::SeqCst);
        let _ = self.tx.send(Command::Shutdown);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn check_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            Err(SurveyError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl Drop for AutosaveScheduler {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

async fn run(
    mut rx: mpsc::UnboundedReceiver<Command>,
    target: Arc<dyn SaveTarget>,
    debounce: Duration,
    pending: Arc<AtomicBool>,
) {
    let mut deadline: Option<Instant> = None;
    let mut coalesced: usize = 0;

    loop {
        let command = match deadline {
            Some(at) => {
                tokio::select! {
                    command = rx.recv() => command,
                    _ = tokio::time::sleep_until(at) => {
                        deadline = None;
                        pending.store(false, Ordering::SeqCst);
                        debug!(changes = coalesced, "debounce elapsed; saving");
                        coalesced = 0;
                        let outcome = target.save().await;
                        debug!(?outcome, "autosave cycle finished");
                        continue;
                    }
                }
            }
            None => rx.recv().await,
        };

        match command {
            Some(Command::Changed) => {
                coalesced += 1;
                deadline = Some(Instant::now() + debounce);
            }
            Some(Command::Flush(reply)) => {
                deadline = None;
                coalesced = 0;
                pending.store(false, Ordering::SeqCst);
                let outcome = target.save().await;
                let _ = reply.send(outcome);
            }
            Some(Command::Cancel) => {
                if deadline.take().is_some() {
                    debug!(changes = coalesced, "pending autosave cancelled");
                }
                coalesced = 0;
            }
            Some(Command::Shutdown) | None => break,
        }
    }
}
