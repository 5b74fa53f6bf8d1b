//! Builders selecting database-backed or in-memory adapters.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::domain::ports::{
    AuditLogRepository, AuditSink, FixtureLoginService, LoginService, UserRepository,
};
use crate::domain::{Error, LoginCredentials, Principal, TransactionService, User};
use crate::inbound::http::state::{HttpState, HttpStatePorts};
use crate::outbound::memory::{MemoryAuditLog, MemoryDatabase, MemoryUserRepository};
use crate::outbound::persistence::{
    DbPool, DieselAuditLog, DieselUserRepository, PgConnectionSource,
};

/// Port implementations shared by the HTTP state and the audit trail.
#[derive(Clone)]
pub struct Adapters {
    pub users: Arc<dyn UserRepository>,
    pub audit_sink: Arc<dyn AuditSink>,
    pub audit_logs: Arc<dyn AuditLogRepository>,
}

impl Adapters {
    /// Diesel adapters over `pool`.
    pub fn postgres(pool: &DbPool) -> Self {
        let source = Arc::new(PgConnectionSource::new(pool.clone()));
        let audit = Arc::new(DieselAuditLog::new(pool.clone()));
        Self {
            users: Arc::new(DieselUserRepository::new(TransactionService::new(source))),
            audit_sink: audit.clone(),
            audit_logs: audit,
        }
    }

    /// In-memory adapters over `db` and `audit`.
    pub fn memory(db: MemoryDatabase, audit: MemoryAuditLog) -> Self {
        let audit = Arc::new(audit);
        Self {
            users: Arc::new(MemoryUserRepository::new(TransactionService::new(Arc::new(
                db,
            )))),
            audit_sink: audit.clone(),
            audit_logs: audit,
        }
    }

    /// Select adapters for an optional pool.
    pub fn from_pool(pool: Option<&DbPool>) -> Self {
        match pool {
            Some(pool) => Self::postgres(pool),
            None => {
                info!("no database configured; using in-memory adapters");
                Self::memory(MemoryDatabase::default(), MemoryAuditLog::default())
            }
        }
    }

    /// HTTP handler state over these adapters.
    pub fn http_state(&self) -> HttpState {
        HttpState::new(HttpStatePorts {
            login: Arc::new(ProvisioningLoginService::new(self.users.clone())),
            users: self.users.clone(),
            audit_logs: self.audit_logs.clone(),
        })
    }
}

/// Login service that records each fixture account in the user store on
/// first login, so the users endpoints can see it.
#[derive(Clone)]
pub struct ProvisioningLoginService {
    users: Arc<dyn UserRepository>,
}

impl ProvisioningLoginService {
    /// Provision accounts into `users`.
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl LoginService for ProvisioningLoginService {
    async fn authenticate(&self, credentials: &LoginCredentials) -> Result<Principal, Error> {
        let principal = FixtureLoginService.authenticate(credentials).await?;
        if self.users.find_by_id(principal.id()).await?.is_none() {
            let role = principal.role().unwrap_or("user");
            let user = User::try_new(principal.id().clone(), credentials.username(), role)
                .map_err(|err| Error::internal(format!("invalid fixture user: {err}")))?;
            self.users.upsert(&user).await?;
            info!(user_id = %principal.id(), "provisioned fixture account");
        }
        Ok(principal)
    }
}
