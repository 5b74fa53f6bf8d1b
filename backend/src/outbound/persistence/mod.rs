//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! This module provides concrete implementations of domain repository ports
//! backed by PostgreSQL via the Diesel ORM with async support through
//! `diesel-async` and `bb8` connection pooling.
//!
//! # Architecture
//!
//! - **Thin adapters**: Repository implementations only translate between
//!   Diesel models and domain types. No business logic resides here.
//! - **Internal models**: Diesel row structs (`models.rs`) and schema
//!   definitions (`schema.rs`) are internal implementation details, never
//!   exposed to the domain layer.
//! - **Transactions through the domain service**: multi-statement writes go
//!   through `TransactionService::run` over [`PgConnectionSource`].
//! - **Strongly typed errors**: All database errors are mapped to domain
//!   persistence error types.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), storefront::outbound::persistence::PoolError> {
//! use std::sync::Arc;
//!
//! use storefront::domain::TransactionService;
//! use storefront::outbound::persistence::{
//!     DbPool, DieselUserRepository, PgConnectionSource, PoolConfig,
//! };
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/storefront")).await?;
//! let source = Arc::new(PgConnectionSource::new(pool));
//! let repo = DieselUserRepository::new(TransactionService::new(source));
//! # Ok(())
//! # }
//! ```

mod connection;
mod diesel_audit_log;
mod diesel_basic_error_mapping;
mod diesel_user_repository;
mod models;
mod pool;
mod schema;

pub use connection::{PgConnection, PgConnectionSource};
pub use diesel_audit_log::DieselAuditLog;
pub use diesel_user_repository::DieselUserRepository;
pub use pool::{DbPool, OwnedConnection, PoolConfig, PoolError};
