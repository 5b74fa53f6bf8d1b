//! Driven ports for transactional database access.
//!
//! A [`ConnectionSource`] hands out one [`TransactionalConnection`] per unit of
//! work. The connection is owned exclusively by the code path that opened it
//! and is released on every exit path.

use async_trait::async_trait;

use crate::domain::Error;

use super::define_port_error;

define_port_error! {
    /// Failures while driving a transaction.
    pub enum TransactionError {
        /// No connection could be obtained.
        Connect { message: String } => "could not acquire a connection: {message}",
        /// `BEGIN` failed.
        Begin { message: String } => "could not begin transaction: {message}",
        /// `COMMIT` failed; the work was not persisted.
        Commit { message: String } => "could not commit transaction: {message}",
        /// `ROLLBACK` failed.
        Rollback { message: String } => "could not roll back transaction: {message}",
        /// Manual transaction control was used out of order.
        IllegalState { message: String } => "illegal transaction state: {message}",
    }
}

impl From<TransactionError> for Error {
    fn from(value: TransactionError) -> Self {
        Self::from_source("transaction failed", value)
    }
}

/// Connection able to run one transaction at a time.
#[async_trait]
pub trait TransactionalConnection: Send {
    /// Open a transaction.
    async fn begin(&mut self) -> Result<(), TransactionError>;

    /// Persist the open transaction.
    async fn commit(&mut self) -> Result<(), TransactionError>;

    /// Discard the open transaction.
    async fn rollback(&mut self) -> Result<(), TransactionError>;

    /// Hand the connection back to its source.
    fn release(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

/// Source of transactional connections, typically a pool.
#[async_trait]
pub trait ConnectionSource: Send + Sync + 'static {
    /// Connection type handed out.
    type Connection: TransactionalConnection + 'static;

    /// Acquire a connection.
    async fn connect(&self) -> Result<Self::Connection, TransactionError>;
}

#[cfg(test)]
mod tests {
    //! Error mapping coverage.
    use super::*;

    #[test]
    fn transaction_errors_become_internal_faults() {
        let err: Error = TransactionError::commit("serialization failure").into();
        assert_eq!(err.status(), 500);
        let Error::Internal(fault) = err else {
            panic!("expected internal fault");
        };
        assert_eq!(
            fault.source_chain(),
            vec!["could not commit transaction: serialization failure"]
        );
    }
}
