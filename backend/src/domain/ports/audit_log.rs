//! Driven ports for the audit trail.
//!
//! [`AuditSink`] is the write side used by the audit interceptor;
//! [`AuditLogRepository`] serves the read and retention side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AuditRecord, Error};

use super::define_port_error;

define_port_error! {
    /// Failures while appending an audit record.
    pub enum AuditSinkError {
        /// The sink could not be reached.
        Connection { message: String } => "audit sink connection failed: {message}",
        /// The record was rejected or could not be written.
        Write { message: String } => "audit sink write failed: {message}",
    }
}

/// Append-only destination for audit records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one record.
    async fn log(&self, record: AuditRecord) -> Result<(), AuditSinkError>;
}

/// Sink that discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureAuditSink;

#[async_trait]
impl AuditSink for FixtureAuditSink {
    async fn log(&self, _record: AuditRecord) -> Result<(), AuditSinkError> {
        Ok(())
    }
}

define_port_error! {
    /// Failures while reading or purging the audit trail.
    pub enum AuditLogRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "audit log connection failed: {message}",
        /// Query failed during execution.
        Query { message: String } => "audit log query failed: {message}",
    }
}

impl From<AuditLogRepositoryError> for Error {
    fn from(value: AuditLogRepositoryError) -> Self {
        Self::from_source("audit log unavailable", value)
    }
}

/// Read and retention access to stored audit records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Most recent records, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<AuditRecord>, AuditLogRepositoryError>;

    /// Delete records created strictly before `cutoff`, returning how many
    /// were removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditLogRepositoryError>;
}
