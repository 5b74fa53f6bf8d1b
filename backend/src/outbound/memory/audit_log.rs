//! In-memory audit trail serving both the sink and the repository ports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::AuditRecord;
use crate::domain::ports::{
    AuditLogRepository, AuditLogRepositoryError, AuditSink, AuditSinkError,
};

#[derive(Debug, Default)]
struct Shared {
    records: Mutex<Vec<AuditRecord>>,
    fail_writes: AtomicBool,
}

/// Shared in-memory audit trail; clones see the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    shared: Arc<Shared>,
}

impl MemoryAuditLog {
    fn records_mut(&self) -> MutexGuard<'_, Vec<AuditRecord>> {
        self.shared
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored records in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records_mut().clone()
    }

    /// Make subsequent writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn log(&self, record: AuditRecord) -> Result<(), AuditSinkError> {
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(AuditSinkError::write("memory audit log rejects writes"));
        }
        self.records_mut().push(record);
        Ok(())
    }
}

#[async_trait]
impl AuditLogRepository for MemoryAuditLog {
    async fn recent(&self, limit: u32) -> Result<Vec<AuditRecord>, AuditLogRepositoryError> {
        let mut records = self.records();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(records)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AuditLogRepositoryError> {
        let mut records = self.records_mut();
        let before = records.len();
        records.retain(|record| record.created_at >= cutoff);
        Ok(u64::try_from(before - records.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    //! Ordering, purge and failure injection.
    use chrono::TimeDelta;

    use super::*;

    fn record_at(created_at: DateTime<Utc>, entity_id: &str) -> AuditRecord {
        AuditRecord {
            user_id: None,
            action: "delete".to_owned(),
            entity_type: "user".to_owned(),
            entity_id: entity_id.to_owned(),
            old_value: None,
            new_value: None,
            ip_address: None,
            user_agent: None,
            request_id: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let log = MemoryAuditLog::default();
        let now = Utc::now();
        for (offset, id) in [(3, "a"), (1, "b"), (2, "c")] {
            log.log(record_at(now - TimeDelta::minutes(offset), id))
                .await
                .expect("write");
        }
        let recent = log.recent(2).await.expect("recent");
        let ids: Vec<&str> = recent.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
    }

    #[tokio::test]
    async fn purge_removes_only_older_records() {
        let log = MemoryAuditLog::default();
        let now = Utc::now();
        log.log(record_at(now - TimeDelta::days(40), "old")).await.expect("write");
        log.log(record_at(now, "new")).await.expect("write");

        let removed = log.purge_before(now - TimeDelta::days(30)).await.expect("purge");
        assert_eq!(removed, 1);
        assert_eq!(log.records().len(), 1);
    }

    #[tokio::test]
    async fn failing_writes_store_nothing() {
        let log = MemoryAuditLog::default();
        log.fail_writes(true);
        assert!(log.log(record_at(Utc::now(), "x")).await.is_err());
        assert!(log.records().is_empty());
    }
}
