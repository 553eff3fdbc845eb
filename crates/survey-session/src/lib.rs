pub mod error;
pub mod types;

pub mod autosave;
pub mod completion;
pub mod config;
pub mod fields;
pub mod navigation;
pub mod reactive;
pub mod session;
pub mod storage;
pub mod submission;

pub use config::SessionOptions;
pub use error::{Result, SurveyError};
pub use session::{CompletedSession, EditingSession, OpenedSession, SessionManager};
pub use types::{FieldMap, FieldValue, SessionKey, SurveyKey, SurveySession, UserId};
