//! bb8 pool of `diesel-async` PostgreSQL connections.
//!
//! Checkouts wait at most [`PoolConfig::checkout_timeout`]. That bound also
//! caps how long a transaction waits to start. Owned checkouts back the
//! transaction service, whose connections outlive the pool borrow.

use std::time::Duration;

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use tracing::debug;

/// Pool construction or checkout failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// No connection became available in time, or the checkout failed.
    #[error("database checkout failed: {message}")]
    Checkout { message: String },

    /// The pool could not be built.
    #[error("database pool could not be built: {message}")]
    Build { message: String },
}

impl PoolError {
    /// Checkout failure carrying `message`.
    pub fn checkout(message: impl Into<String>) -> Self {
        Self::Checkout {
            message: message.into(),
        }
    }

    /// Build failure carrying `message`.
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }
}

/// Pool limits.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use storefront::outbound::persistence::PoolConfig;
///
/// let config = PoolConfig::new("postgres://shop@localhost/storefront")
///     .with_max_connections(20)
///     .with_checkout_timeout(Duration::from_secs(5));
/// assert_eq!(config.max_connections(), 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    database_url: String,
    max_connections: u32,
    min_idle: Option<u32>,
    checkout_timeout: Duration,
}

impl PoolConfig {
    /// Default upper bound on open connections.
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    /// Default checkout wait.
    pub const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Limits for `database_url`: ten connections, a 30 second checkout
    /// wait and no idle floor.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            min_idle: None,
            checkout_timeout: Self::DEFAULT_CHECKOUT_TIMEOUT,
        }
    }

    /// Cap open connections at `max`, never below one.
    #[must_use]
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Keep `min_idle` connections open, clamped to the connection cap.
    #[must_use]
    pub fn with_min_idle(mut self, min_idle: Option<u32>) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Wait at most `timeout` for a connection.
    #[must_use]
    pub fn with_checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn min_idle(&self) -> Option<u32> {
        self.min_idle.map(|idle| idle.min(self.max_connections))
    }

    pub fn checkout_timeout(&self) -> Duration {
        self.checkout_timeout
    }
}

/// Connection checked out of a [`DbPool`] independently of the pool borrow.
pub type OwnedConnection = PooledConnection<'static, AsyncPgConnection>;

/// Shared PostgreSQL pool.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> Result<(), storefront::outbound::persistence::PoolError> {
/// use storefront::outbound::persistence::{DbPool, PoolConfig};
///
/// let pool = DbPool::new(PoolConfig::new("postgres://localhost/storefront")).await?;
/// let _conn = pool.get().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DbPool {
    inner: Pool<AsyncPgConnection>,
}

impl DbPool {
    /// Build a pool with `config`'s limits.
    ///
    /// # Errors
    /// [`PoolError::Build`] when the URL is unusable or the idle floor cannot
    /// be established.
    pub async fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.database_url());
        let inner = Pool::builder()
            .max_size(config.max_connections())
            .min_idle(config.min_idle())
            .connection_timeout(config.checkout_timeout())
            .build(manager)
            .await
            .map_err(|err| PoolError::build(err.to_string()))?;
        debug!(
            max_connections = config.max_connections(),
            checkout_timeout = ?config.checkout_timeout(),
            "database pool built"
        );
        Ok(Self { inner })
    }

    /// Borrow a connection for a single statement.
    ///
    /// # Errors
    /// [`PoolError::Checkout`] when no connection frees up within the
    /// checkout timeout.
    pub async fn get(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, PoolError> {
        self.inner
            .get()
            .await
            .map_err(|err| PoolError::checkout(err.to_string()))
    }

    /// Connection that does not borrow the pool.
    ///
    /// # Errors
    /// Same as [`Self::get`].
    pub async fn get_owned(&self) -> Result<OwnedConnection, PoolError> {
        self.inner
            .get_owned()
            .await
            .map_err(|err| PoolError::checkout(err.to_string()))
    }
}

impl std::fmt::Debug for DbPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state();
        f.debug_struct("DbPool")
            .field("connections", &state.connections)
            .field("idle", &state.idle_connections)
            .finish()
    }
}
