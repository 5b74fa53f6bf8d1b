//! Audit trail read endpoint.
//!
//! ```text
//! GET /api/v1/audit-logs?limit=50
//! ```

use actix_web::web;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::{ApiResult, AuditRecord, Error};
use crate::inbound::http::state::HttpState;

/// Records returned when no limit is given.
pub const DEFAULT_LIMIT: u32 = 50;
/// Largest accepted limit.
pub const MAX_LIMIT: u32 = 500;

/// Query string for [`list_audit_logs`].
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub limit: Option<u32>,
}

impl AuditLogQuery {
    fn limit(&self) -> ApiResult<u32> {
        match self.limit.unwrap_or(DEFAULT_LIMIT) {
            limit @ 1..=MAX_LIMIT => Ok(limit),
            _ => {
                let mut errors = Map::new();
                errors.insert("limit".to_owned(), Value::from("limitOutOfRange"));
                Err(Error::validation(errors))
            }
        }
    }
}

/// Most recent audit records, newest first.
pub async fn list_audit_logs(
    state: web::Data<HttpState>,
    query: web::Query<AuditLogQuery>,
) -> ApiResult<web::Json<Vec<AuditRecord>>> {
    let limit = query.limit()?;
    let records = state.audit_logs.recent(limit).await?;
    Ok(web::Json(records))
}
