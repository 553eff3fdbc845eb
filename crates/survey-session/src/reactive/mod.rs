//! Reactive layer: synchronous notifications for field writes, save status
//! transitions and completion lookups.
//!
//! - [`event_emitter`]: generic typed pub/sub ([`EventEmitter<T>`]).
//! - [`event`]: [`FieldChange`], [`StatusTransition`] and
//!   [`CompletionChange`] payloads.

pub mod event;
pub mod event_emitter;

pub use event::{CompletionChange, FieldChange, StatusTransition};
pub use event_emitter::{EventEmitter, ListenerId, Unsubscribe};
