//! Test helpers for inbound HTTP components.

use std::sync::Arc;

use actix_session::{SessionMiddleware, storage::CookieSessionStore};
use actix_web::cookie::Key;

use crate::domain::ports::FixtureLoginService;
use crate::domain::{Principal, TransactionService, User, UserId};
use crate::inbound::http::state::{HttpState, HttpStatePorts};
use crate::outbound::memory::{MemoryAuditLog, MemoryDatabase, MemoryUserRepository};

/// Build a session middleware configured for tests.
///
/// - Generates a fresh signing/encryption key per invocation.
/// - Sets the cookie name to `session` and disables the `Secure` flag for
///   local HTTP tests.
pub fn test_session_middleware() -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
        .cookie_name("session".to_owned())
        .cookie_secure(false)
        .build()
}

/// Identifier of the seeded user returned by [`seeded_user`].
pub const SEEDED_ID: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

/// The user every [`test_state`] database starts with.
pub fn seeded_user() -> User {
    let id = UserId::new(SEEDED_ID).expect("fixture id");
    User::try_new(id, "Ada Lovelace", "user").expect("fixture user")
}

/// Principal with `role` and a random id.
pub fn principal(role: &str) -> Principal {
    Principal::new(UserId::random(), Some(role.to_owned()))
}

/// Handler state over in-memory adapters, with handles to inspect them.
pub struct TestState {
    pub state: HttpState,
    pub db: MemoryDatabase,
    pub audit: MemoryAuditLog,
}

/// Memory-backed state seeded with [`seeded_user`].
pub fn test_state() -> TestState {
    let db = MemoryDatabase::with_users([seeded_user()]);
    let audit = MemoryAuditLog::default();
    let state = HttpState::new(HttpStatePorts {
        login: Arc::new(FixtureLoginService),
        users: Arc::new(MemoryUserRepository::new(TransactionService::new(
            Arc::new(db.clone()),
        ))),
        audit_logs: Arc::new(audit.clone()),
    });
    TestState { state, db, audit }
}
