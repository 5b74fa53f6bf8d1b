//! Shared helpers for storefront integration tests.
//!
//! Integration tests compile as separate crates, so each test binary pulls
//! this module in with `mod support;` and uses what it needs.

#![allow(dead_code, reason = "each test crate uses a different subset")]

use std::sync::Arc;
use std::time::Duration;

use actix_http::Request;
use actix_web::body::{self, MessageBody};
use actix_web::cookie::{Cookie, Key, SameSite};
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::http::header::HeaderMap;
use actix_web::test;
use mockable::DefaultClock;
use serde_json::{Value, json};
use storefront::domain::{Localizer, User, UserId};
use storefront::outbound::i18n::JsonCatalogue;
use storefront::outbound::memory::{MemoryAuditLog, MemoryDatabase};
use storefront::server::{Adapters, AppDependencies, RateLimit};

/// Identifier of the customer seeded into every [`TestApp`] store.
pub const CUSTOMER_ID: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

/// Application dependencies over in-memory adapters, with handles to inspect
/// them.
pub struct TestApp {
    pub deps: AppDependencies,
    pub db: MemoryDatabase,
    pub audit: MemoryAuditLog,
}

/// User seeded into the store.
pub fn customer() -> User {
    let id = UserId::new(CUSTOMER_ID).expect("fixture id");
    User::try_new(id, "Ada Lovelace", "user").expect("fixture user")
}

/// Memory-backed application using the embedded catalogue.
pub fn memory_app() -> TestApp {
    let db = MemoryDatabase::with_users([customer()]);
    let audit = MemoryAuditLog::default();
    let adapters = Adapters::memory(db.clone(), audit.clone());
    let catalogue = JsonCatalogue::embedded().expect("embedded catalogue");
    let localizer = Localizer::new(Arc::new(catalogue), "en");
    let deps = AppDependencies::new(&adapters, localizer, Arc::new(DefaultClock), Key::generate())
        .with_cookie_policy(false, SameSite::Lax);
    TestApp { deps, db, audit }
}

/// [`memory_app`] admitting `max_requests` per minute.
pub fn throttled_app(max_requests: u32) -> TestApp {
    let mut app = memory_app();
    app.deps = app.deps.with_rate_limit(RateLimit {
        max_requests,
        window: Duration::from_secs(60),
        ..RateLimit::default()
    });
    app
}

/// Log in as `username` and return the session cookie.
pub async fn login<S, B>(app: &S, username: &str) -> Cookie<'static>
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/api/v1/login")
        .set_json(json!({"username": username, "password": "password"}))
        .to_request();
    let res = test::call_service(app, req).await;
    assert!(res.status().is_success(), "login as {username} failed");
    res.response()
        .cookies()
        .find(|cookie| cookie.name() == "session")
        .expect("session cookie")
        .into_owned()
}

/// Send `req` and return its status and JSON body (`null` when empty).
pub async fn send<S, B>(app: &S, req: Request) -> (u16, Value)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let (status, _, body) = respond(app, req).await;
    (status.as_u16(), body)
}

/// Send `req` and return status, headers and JSON body.
///
/// Errors escaping the application are rendered through their
/// `error_response`, as the HTTP dispatcher does.
pub async fn respond<S, B>(app: &S, req: Request) -> (StatusCode, HeaderMap, Value)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let (status, headers, bytes) = match app.call(req).await {
        Ok(res) => {
            let status = res.status();
            let headers = res.headers().clone();
            (status, headers, test::read_body(res).await)
        }
        Err(err) => {
            let res = err.error_response();
            let status = res.status();
            let headers = res.headers().clone();
            let bytes = body::to_bytes(res.into_body()).await.expect("error body");
            (status, headers, bytes)
        }
    };
    if bytes.is_empty() {
        return (status, headers, Value::Null);
    }
    (status, headers, serde_json::from_slice(&bytes).expect("json body"))
}

/// Wait until `audit` holds at least `count` records.
pub async fn await_records(audit: &MemoryAuditLog, count: usize) {
    for _ in 0..100 {
        if audit.records().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} audit records, found {}", audit.records().len());
}
