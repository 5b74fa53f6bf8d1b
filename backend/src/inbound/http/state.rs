//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on domain ports and remain testable without I/O.

use std::sync::Arc;

use crate::domain::ports::{AuditLogRepository, LoginService, UserRepository};

/// Parameter object bundling the port implementations for HTTP handlers.
#[derive(Clone)]
pub struct HttpStatePorts {
    pub login: Arc<dyn LoginService>,
    pub users: Arc<dyn UserRepository>,
    pub audit_logs: Arc<dyn AuditLogRepository>,
}

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub login: Arc<dyn LoginService>,
    pub users: Arc<dyn UserRepository>,
    pub audit_logs: Arc<dyn AuditLogRepository>,
}

impl HttpState {
    /// Construct state from a ports bundle.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    ///
    /// use storefront::domain::TransactionService;
    /// use storefront::domain::ports::FixtureLoginService;
    /// use storefront::inbound::http::state::{HttpState, HttpStatePorts};
    /// use storefront::outbound::memory::{MemoryAuditLog, MemoryDatabase, MemoryUserRepository};
    ///
    /// let db = Arc::new(MemoryDatabase::default());
    /// let state = HttpState::new(HttpStatePorts {
    ///     login: Arc::new(FixtureLoginService),
    ///     users: Arc::new(MemoryUserRepository::new(TransactionService::new(db))),
    ///     audit_logs: Arc::new(MemoryAuditLog::default()),
    /// });
    /// let _users = state.users.clone();
    /// ```
    pub fn new(ports: HttpStatePorts) -> Self {
        let HttpStatePorts {
            login,
            users,
            audit_logs,
        } = ports;
        Self {
            login,
            users,
            audit_logs,
        }
    }
}
