//! Listener registry behind field-change and save-status notifications.
//!
//! `emit` copies the current listener list and releases the lock before
//! calling anyone. A callback may therefore subscribe or unsubscribe while it
//! runs: removals still receive the event being delivered, additions wait for
//! the next one.
//!
//! There is no isolation: a panicking listener unwinds through `emit`, and
//! listeners after it miss that event. The emitter itself stays usable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Handle from [`EventEmitter::on`], accepted by [`EventEmitter::off`].
pub type ListenerId = u64;

pub type ListenerFn<T> = dyn Fn(&T) + Send + Sync;

/// An owned one-shot closure that removes a subscription when called.
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

/// Synchronous fan-out of `T` events to registered closures.
pub struct EventEmitter<T> {
    listeners: Mutex<Vec<(ListenerId, Arc<ListenerFn<T>>)>>,
    next_id: AtomicU64,
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn on(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove the listener identified by `id`. Unknown ids are ignored.
    pub fn off(&self, id: ListenerId) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    /// Emit `event` to every listener registered when the call started.
    /// The lock is released before any callback runs.
    pub fn emit(&self, event: &T) {
        let listeners: Vec<Arc<ListenerFn<T>>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn size(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<T: 'static> EventEmitter<T> {
    /// Register `callback` on a shared emitter and hand back an
    /// [`Unsubscribe`] closure. The closure holds only a weak reference, so a
    /// forgotten handle never keeps the emitter alive.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&T) + Send + Sync + 'static,
    ) -> Unsubscribe
    where
        T: Send + Sync,
    {
        let id = self.on(callback);
        let weak: Weak<Self> = Arc::downgrade(self);
        Box::new(move || {
            if let Some(emitter) = weak.upgrade() {
                emitter.off(id);
            }
        })
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}
