//! PostgreSQL implementation of the transaction ports.
//!
//! [`PgConnectionSource`] checks owned connections out of a [`DbPool`];
//! [`PgConnection`] drives `BEGIN`/`COMMIT`/`ROLLBACK` through Diesel's
//! transaction manager so Diesel's own depth tracking stays consistent.
//! Dropping a [`PgConnection`] returns it to the pool.

use async_trait::async_trait;
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, TransactionManager};

use super::diesel_basic_error_mapping::pool_error_message;
use super::pool::{DbPool, OwnedConnection};
use crate::domain::ports::{ConnectionSource, TransactionError, TransactionalConnection};

/// Pool-backed [`ConnectionSource`].
#[derive(Debug, Clone)]
pub struct PgConnectionSource {
    pool: DbPool,
}

impl PgConnectionSource {
    /// Source checking connections out of `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Underlying pool, for reads that need no transaction.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionSource for PgConnectionSource {
    type Connection = PgConnection;

    async fn connect(&self) -> Result<Self::Connection, TransactionError> {
        self.pool
            .get_owned()
            .await
            .map(|conn| PgConnection { conn })
            .map_err(|err| TransactionError::connect(pool_error_message(err)))
    }
}

/// Pooled PostgreSQL connection owned by one unit of work.
pub struct PgConnection {
    conn: OwnedConnection,
}

impl PgConnection {
    /// Diesel connection for running queries.
    pub fn pg(&mut self) -> &mut AsyncPgConnection {
        &mut self.conn
    }
}

#[async_trait]
impl TransactionalConnection for PgConnection {
    async fn begin(&mut self) -> Result<(), TransactionError> {
        AnsiTransactionManager::begin_transaction(self.pg())
            .await
            .map_err(|err| TransactionError::begin(err.to_string()))
    }

    async fn commit(&mut self) -> Result<(), TransactionError> {
        AnsiTransactionManager::commit_transaction(self.pg())
            .await
            .map_err(|err| TransactionError::commit(err.to_string()))
    }

    async fn rollback(&mut self) -> Result<(), TransactionError> {
        AnsiTransactionManager::rollback_transaction(self.pg())
            .await
            .map_err(|err| TransactionError::rollback(err.to_string()))
    }
}
