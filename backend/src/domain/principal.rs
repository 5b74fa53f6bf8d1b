//! Authenticated caller identity.

use serde::{Deserialize, Serialize};

use super::UserId;

/// Identity attached to a request by the authentication middleware.
///
/// Consumed read-only by the permission guard and the audit interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    id: UserId,
    role: Option<String>,
}

impl Principal {
    /// Build a principal with an optional role identifier.
    #[must_use]
    pub fn new(id: UserId, role: Option<String>) -> Self {
        Self { id, role }
    }

    /// Caller identifier.
    #[must_use]
    pub fn id(&self) -> &UserId {
        &self.id
    }

    /// Role identifier, when the session carries one.
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }
}
