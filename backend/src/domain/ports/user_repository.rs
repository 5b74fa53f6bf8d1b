//! Port abstraction for user persistence adapters and their errors.
use async_trait::async_trait;

use crate::domain::{Error, User, UserId};

use super::{TransactionError, define_port_error};

define_port_error! {
    /// Persistence errors raised by user repository adapters.
    pub enum UserPersistenceError {
        /// Repository connection could not be established.
        Connection { message: String } => "user repository connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "user repository query failed: {message}",
    }
}

impl From<TransactionError> for UserPersistenceError {
    fn from(value: TransactionError) -> Self {
        match value {
            TransactionError::Connect { message } => Self::connection(message),
            other => Self::query(other.to_string()),
        }
    }
}

impl From<UserPersistenceError> for Error {
    fn from(value: UserPersistenceError) -> Self {
        Self::from_source("user repository unavailable", value)
    }
}

/// Storage for user accounts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert or update a user record.
    async fn upsert(&self, user: &User) -> Result<(), UserPersistenceError>;

    /// Fetch a user by identifier.
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, UserPersistenceError>;

    /// All users ordered by display name.
    async fn list(&self) -> Result<Vec<User>, UserPersistenceError>;

    /// Remove a user, returning the deleted record when it existed.
    ///
    /// Adapters run the deletion inside a single transaction.
    async fn delete(&self, id: &UserId) -> Result<Option<User>, UserPersistenceError>;
}
