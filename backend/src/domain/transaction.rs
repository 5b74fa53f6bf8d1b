//! Transaction service.
//!
//! [`TransactionService::run`] executes a unit of work inside one transaction
//! and always releases the connection. [`TransactionScope`] exposes the same
//! lifecycle step by step for callers that need manual control.
//!
//! Within one unit of work the order is strictly
//! connect, begin, work, commit or rollback, release.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use diesel_async::scoped_futures::ScopedBoxFuture;
use futures_util::FutureExt;
use tracing::warn;

use super::ports::{ConnectionSource, TransactionError, TransactionalConnection};

/// Runs units of work against connections from `S`.
pub struct TransactionService<S> {
    source: Arc<S>,
}

impl<S> Clone for TransactionService<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

async fn rollback_quietly<C: TransactionalConnection>(conn: &mut C) {
    if let Err(err) = conn.rollback().await {
        warn!(error = %err, "rollback failed; connection released without it");
    }
}

impl<S: ConnectionSource> TransactionService<S> {
    /// Service drawing connections from `source`.
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Connection source backing this service.
    #[must_use]
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Open a manual transaction scope.
    #[must_use]
    pub fn scope(&self) -> TransactionScope<S> {
        TransactionScope::new(Arc::clone(&self.source))
    }

    /// Execute `work` inside one transaction.
    ///
    /// Commits when `work` returns `Ok`. Rolls back when it returns `Err` or
    /// panics; the error is returned unchanged and a panic resumes after the
    /// rollback. The connection is released on every path.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    /// use diesel_async::scoped_futures::ScopedFutureExt;
    /// use storefront::domain::{Error, TransactionService};
    /// use storefront::outbound::memory::MemoryDatabase;
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let db = Arc::new(MemoryDatabase::default());
    /// let service = TransactionService::new(db.clone());
    /// let count = service
    ///     .run(|conn| async move { Ok::<_, Error>(conn.users().len()) }.scope_boxed())
    ///     .await
    ///     .expect("work succeeds");
    /// assert_eq!(count, 0);
    /// assert_eq!(db.open_connections(), 0);
    /// # });
    /// ```
    pub async fn run<'a, T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'r> FnOnce(&'r mut S::Connection) -> ScopedBoxFuture<'a, 'r, Result<T, E>>
            + Send
            + 'a,
        E: From<TransactionError> + Send + 'a,
        T: Send + 'a,
    {
        let mut conn = self.source.connect().await?;
        if let Err(err) = conn.begin().await {
            conn.release();
            return Err(err.into());
        }

        let outcome = AssertUnwindSafe(work(&mut conn)).catch_unwind().await;
        match outcome {
            Ok(Ok(value)) => match conn.commit().await {
                Ok(()) => {
                    conn.release();
                    Ok(value)
                }
                Err(err) => {
                    rollback_quietly(&mut conn).await;
                    conn.release();
                    Err(err.into())
                }
            },
            Ok(Err(err)) => {
                rollback_quietly(&mut conn).await;
                conn.release();
                Err(err)
            }
            Err(panic) => {
                rollback_quietly(&mut conn).await;
                conn.release();
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// Manually driven transaction.
///
/// At most one transaction is open per scope. Dropping a scope with an open
/// transaction logs a warning and releases the connection uncommitted.
pub struct TransactionScope<S: ConnectionSource> {
    source: Arc<S>,
    active: Option<S::Connection>,
}

impl<S: ConnectionSource> TransactionScope<S> {
    /// Idle scope drawing from `source`.
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            active: None,
        }
    }

    /// Whether a transaction is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Acquire a connection and open a transaction.
    ///
    /// # Errors
    /// [`TransactionError::IllegalState`] when a transaction is already open.
    pub async fn start_transaction(&mut self) -> Result<(), TransactionError> {
        if self.active.is_some() {
            return Err(TransactionError::illegal_state(
                "a transaction is already open",
            ));
        }
        let mut conn = self.source.connect().await?;
        if let Err(err) = conn.begin().await {
            conn.release();
            return Err(err);
        }
        self.active = Some(conn);
        Ok(())
    }

    /// Connection of the open transaction.
    ///
    /// # Errors
    /// [`TransactionError::IllegalState`] when no transaction is open.
    pub fn connection(&mut self) -> Result<&mut S::Connection, TransactionError> {
        self.active
            .as_mut()
            .ok_or_else(|| TransactionError::illegal_state("no transaction is open"))
    }

    /// Commit and release.
    ///
    /// A failed commit is followed by a rollback; the scope is idle afterwards
    /// either way.
    ///
    /// # Errors
    /// [`TransactionError::IllegalState`] when no transaction is open, or the
    /// commit failure.
    pub async fn commit(&mut self) -> Result<(), TransactionError> {
        let mut conn = self.take("commit")?;
        let result = conn.commit().await;
        if result.is_err() {
            rollback_quietly(&mut conn).await;
        }
        conn.release();
        result
    }

    /// Roll back and release.
    ///
    /// # Errors
    /// [`TransactionError::IllegalState`] when no transaction is open, or the
    /// rollback failure.
    pub async fn rollback(&mut self) -> Result<(), TransactionError> {
        let mut conn = self.take("roll back")?;
        let result = conn.rollback().await;
        conn.release();
        result
    }

    fn take(&mut self, action: &str) -> Result<S::Connection, TransactionError> {
        self.active.take().ok_or_else(|| {
            TransactionError::illegal_state(format!("cannot {action}: no transaction is open"))
        })
    }
}

impl<S: ConnectionSource> Drop for TransactionScope<S> {
    fn drop(&mut self) {
        if let Some(conn) = self.active.take() {
            warn!("transaction scope dropped while open; releasing without commit");
            conn.release();
        }
    }
}
