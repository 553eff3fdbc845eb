//! Autosave: debounce scheduling, the save cycle and the status indicator.

pub mod cycle;
pub mod scheduler;
pub mod status;

pub use cycle::{SaveCycle, SaveOutcome};
pub use scheduler::{AutosaveScheduler, SaveTarget};
pub use status::{SaveStatus, SaveStatusMachine};
