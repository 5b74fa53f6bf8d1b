//! Audit trail records, route audit specifications and asynchronous dispatch.
//!
//! Auditable routes describe what to record with an [`AuditSpec`]. After a
//! successful handler the interceptor builds an [`AuditRecord`] and hands it
//! to an [`AuditDispatcher`], which writes it on a detached task. Sink
//! failures are logged there and never reach the response path.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ports::{AuditLogRepository, AuditLogRepositoryError, AuditSink};
use super::{Principal, RequestId};

/// Entity identifier recorded when the route parameter is absent.
pub const UNKNOWN_ENTITY: &str = "unknown";

/// Route parameter read for the entity identifier by default.
pub const DEFAULT_ID_PARAM: &str = "id";

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Acting principal, `None` for anonymous calls.
    pub user_id: Option<String>,
    /// Verb such as `delete`.
    pub action: String,
    /// Entity kind such as `user`.
    pub entity_type: String,
    /// Identifier of the affected entity, or [`UNKNOWN_ENTITY`].
    pub entity_id: String,
    /// State before the change.
    pub old_value: Option<Value>,
    /// State after the change.
    pub new_value: Option<Value>,
    /// Client address.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Correlation identifier of the originating request.
    pub request_id: Option<String>,
    /// Time the record was built.
    pub created_at: DateTime<Utc>,
}

/// What an auditable route records.
///
/// # Examples
/// ```
/// use storefront::domain::AuditSpec;
///
/// let spec = AuditSpec::new("delete", "user").include_response();
/// assert_eq!(spec.id_param(), "id");
/// assert!(spec.includes_response());
/// assert!(!spec.includes_body());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSpec {
    action: String,
    entity_type: String,
    id_param: String,
    include_body: bool,
    include_response: bool,
}

/// Request facts gathered by the interceptor for one audit record.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditInput<'a> {
    /// Authenticated caller.
    pub actor: Option<&'a Principal>,
    /// Value of the configured route parameter.
    pub entity_id: Option<&'a str>,
    /// Raw request body.
    pub request_body: Option<&'a [u8]>,
    /// Raw handler response body.
    pub response_body: Option<&'a [u8]>,
    /// Client address.
    pub ip_address: Option<&'a str>,
    /// `User-Agent` header.
    pub user_agent: Option<&'a str>,
    /// Request correlation identifier.
    pub request_id: Option<&'a RequestId>,
}

impl AuditSpec {
    /// Record `action` on `entity_type`, reading the default `id` parameter.
    pub fn new(action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            entity_type: entity_type.into(),
            id_param: DEFAULT_ID_PARAM.to_owned(),
            include_body: false,
            include_response: false,
        }
    }

    /// Read the entity identifier from route parameter `name`.
    #[must_use]
    pub fn with_id_param(mut self, name: impl Into<String>) -> Self {
        self.id_param = name.into();
        self
    }

    /// Record the request body as the new value.
    #[must_use]
    pub fn include_body(mut self) -> Self {
        self.include_body = true;
        self
    }

    /// Record the handler response as the new value.
    #[must_use]
    pub fn include_response(mut self) -> Self {
        self.include_response = true;
        self
    }

    /// Audited verb.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Audited entity kind.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Route parameter holding the entity identifier.
    #[must_use]
    pub fn id_param(&self) -> &str {
        &self.id_param
    }

    /// Whether the request body is captured.
    #[must_use]
    pub fn includes_body(&self) -> bool {
        self.include_body
    }

    /// Whether the response body is captured.
    #[must_use]
    pub fn includes_response(&self) -> bool {
        self.include_response
    }

    /// Whether the interceptor needs to buffer the request body.
    #[must_use]
    pub fn needs_request_body(&self) -> bool {
        self.include_body && !self.include_response
    }

    /// Build the record for one successful call.
    ///
    /// `newValue` is the response body when responses are included, else
    /// the request body when bodies are included, else absent. `oldValue`
    /// is never populated by the interceptor.
    #[must_use]
    pub fn record(&self, input: AuditInput<'_>, clock: &dyn Clock) -> AuditRecord {
        let new_value = if self.include_response {
            Some(body_value(input.response_body))
        } else if self.include_body {
            Some(body_value(input.request_body))
        } else {
            None
        };
        AuditRecord {
            user_id: input.actor.map(|p| p.id().to_string()),
            action: self.action.clone(),
            entity_type: self.entity_type.clone(),
            entity_id: input
                .entity_id
                .filter(|id| !id.is_empty())
                .unwrap_or(UNKNOWN_ENTITY)
                .to_owned(),
            old_value: None,
            new_value,
            ip_address: input.ip_address.map(str::to_owned),
            user_agent: input.user_agent.map(str::to_owned),
            request_id: input.request_id.map(ToString::to_string),
            created_at: clock.utc(),
        }
    }
}

/// Parse a captured body; non-JSON bodies become a JSON string.
fn body_value(body: Option<&[u8]>) -> Value {
    match body {
        None | Some([]) => Value::Null,
        Some(bytes) => serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}

/// Writes audit records on detached tasks.
#[derive(Clone)]
pub struct AuditDispatcher {
    sink: Arc<dyn AuditSink>,
}

impl AuditDispatcher {
    /// Dispatcher writing to `sink`.
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Spawn the write of `record` and return immediately.
    ///
    /// The task runs with the caller's request id in scope. The handle is
    /// returned for tests; the request path never awaits it.
    pub fn dispatch(&self, record: AuditRecord) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let request_id = RequestId::current();
        let write = async move {
            let action = record.action.clone();
            let entity_type = record.entity_type.clone();
            match sink.log(record).await {
                Ok(()) => debug!(%action, %entity_type, "audit record written"),
                Err(err) => {
                    let request_id = RequestId::current();
                    error!(
                        %action,
                        %entity_type,
                        request_id = request_id.as_ref().map(RequestId::as_str),
                        error = %err,
                        "audit write failed"
                    );
                }
            }
        };
        tokio::spawn(async move {
            match request_id {
                Some(id) => RequestId::scope(id, write).await,
                None => write.await,
            }
        })
    }
}

impl std::fmt::Debug for AuditDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditDispatcher").finish_non_exhaustive()
    }
}

/// Periodically purges audit records older than the retention window.
#[derive(Clone)]
pub struct AuditRetention {
    repository: Arc<dyn AuditLogRepository>,
    clock: Arc<dyn Clock>,
    retention: TimeDelta,
}

impl AuditRetention {
    /// Keep records for `retention_days` days.
    pub fn new(
        repository: Arc<dyn AuditLogRepository>,
        clock: Arc<dyn Clock>,
        retention_days: u32,
    ) -> Self {
        Self {
            repository,
            clock,
            retention: TimeDelta::days(i64::from(retention_days)),
        }
    }

    /// Oldest creation time that survives a purge run now.
    #[must_use]
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.clock
            .utc()
            .checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Purge once, returning the number of removed records.
    pub async fn purge_once(&self) -> Result<u64, AuditLogRepositoryError> {
        let cutoff = self.cutoff();
        let removed = self.repository.purge_before(cutoff).await?;
        info!(removed, %cutoff, "audit retention purge completed");
        Ok(removed)
    }

    /// Run [`Self::purge_once`] every `period` until the task is aborted.
    ///
    /// Failures are logged and the schedule continues.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.purge_once().await {
                    warn!(error = %err, "audit retention purge failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for AuditRetention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRetention")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}
