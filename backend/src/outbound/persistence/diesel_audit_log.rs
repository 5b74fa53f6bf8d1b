//! PostgreSQL-backed audit trail: the write sink and the read/retention
//! repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::AuditRecord;
use crate::domain::ports::{
    AuditLogRepository, AuditLogRepositoryError, AuditSink, AuditSinkError,
};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{AuditLogRow, NewAuditLogRow};
use super::pool::{DbPool, PoolError};
use super::schema::audit_logs;

/// Diesel-backed audit log.
#[derive(Debug, Clone)]
pub struct DieselAuditLog {
    pool: DbPool,
}

impl DieselAuditLog {
    /// Audit log stored in the `audit_logs` table reachable through `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn repository_error(error: diesel::result::Error) -> AuditLogRepositoryError {
    map_basic_diesel_error(
        error,
        |message| AuditLogRepositoryError::query(message),
        |message| AuditLogRepositoryError::connection(message),
    )
}

fn repository_pool_error(error: PoolError) -> AuditLogRepositoryError {
    map_basic_pool_error(error, AuditLogRepositoryError::connection)
}

#[async_trait]
impl AuditSink for DieselAuditLog {
    async fn log(&self, record: AuditRecord) -> Result<(), AuditSinkError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| map_basic_pool_error(err, AuditSinkError::connection))?;
        diesel::insert_into(audit_logs::table)
            .values(NewAuditLogRow::from(record))
            .execute(&mut conn)
            .await
            .map(drop)
            .map_err(|err| {
                map_basic_diesel_error(
                    err,
                    |message| AuditSinkError::write(message),
                    |message| AuditSinkError::connection(message),
                )
            })
    }
}

#[async_trait]
impl AuditLogRepository for DieselAuditLog {
    async fn recent(&self, limit: u32) -> Result<Vec<AuditRecord>, AuditLogRepositoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(repository_pool_error)?;
        let rows: Vec<AuditLogRow> = audit_logs::table
            .select(AuditLogRow::as_select())
            .order((audit_logs::created_at.desc(), audit_logs::id.desc()))
            .limit(i64::from(limit))
            .load(&mut conn)
            .await
            .map_err(repository_error)?;
        Ok(rows.into_iter().map(AuditRecord::from).collect())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditLogRepositoryError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(repository_pool_error)?;
        let removed = diesel::delete(audit_logs::table.filter(audit_logs::created_at.lt(cutoff)))
            .execute(&mut conn)
            .await
            .map_err(repository_error)?;
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}
