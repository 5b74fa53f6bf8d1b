//! In-memory adapters used when no database is configured and in tests.

mod audit_log;
mod store;
mod users;

pub use audit_log::MemoryAuditLog;
pub use store::{MemoryConnection, MemoryDatabase};
pub use users::MemoryUserRepository;
