//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod audit_log;
mod login_service;
mod transaction;
mod translator;
mod user_repository;

#[cfg(test)]
pub use audit_log::{MockAuditLogRepository, MockAuditSink};
pub use audit_log::{
    AuditLogRepository, AuditLogRepositoryError, AuditSink, AuditSinkError, FixtureAuditSink,
};
#[cfg(test)]
pub use login_service::MockLoginService;
pub use login_service::{FixtureLoginService, LoginService};
pub use transaction::{ConnectionSource, TransactionError, TransactionalConnection};
#[cfg(test)]
pub use translator::MockTranslator;
pub use translator::Translator;
#[cfg(test)]
pub use user_repository::MockUserRepository;
pub use user_repository::{UserPersistenceError, UserRepository};
