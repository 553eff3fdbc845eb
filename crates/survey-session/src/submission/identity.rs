//! Identity seam: who owns the session and which email fills draft rows.

use crate::types::UserId;

pub trait IdentityProvider: Send + Sync {
    fn user_id(&self) -> UserId;

    /// Email used for draft rows until the form has one.
    fn default_email(&self) -> Option<String> {
        None
    }
}

/// A fixed identity, e.g. taken from an already-authenticated request.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    user_id: UserId,
    email: Option<String>,
}

impl StaticIdentity {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl IdentityProvider for StaticIdentity {
    fn user_id(&self) -> UserId {
        self.user_id.clone()
    }

    fn default_email(&self) -> Option<String> {
        self.email.clone()
    }
}
