//! Final submission and its two external seams (schema validation and
//! identity).

pub mod coordinator;
pub mod identity;
pub mod validator;

pub use coordinator::SubmissionCoordinator;
pub use identity::{IdentityProvider, StaticIdentity};
pub use validator::{RequiredFieldsValidator, SchemaValidator};
