//! Commit, rollback and release around whole handlers.

use actix_web::body::to_bytes;
use actix_web::http::StatusCode;
use actix_web::{App, HttpResponse, test, web};
use rstest::{fixture, rstest};
use serde_json::Value;

use super::*;
use crate::domain::{ApiResult, Localizer, User, UserId};
use crate::middleware::ExceptionFilter;
use crate::outbound::memory::MemoryDatabase;

type MemoryTx = Tx<MemoryDatabase>;

fn user(name: &str) -> User {
    User::try_new(UserId::random(), name, "user").expect("valid user")
}

async fn create(tx: MemoryTx, name: web::Path<String>) -> ApiResult<HttpResponse> {
    let mut scope = tx.lock().await;
    scope.connection()?.upsert_user(user(&name));
    Ok(HttpResponse::Created().finish())
}

async fn create_two_then_fail(tx: MemoryTx) -> ApiResult<HttpResponse> {
    let mut scope = tx.lock().await;
    let conn = scope.connection()?;
    conn.upsert_user(user("Ada"));
    conn.upsert_user(user("Grace"));
    Err(Error::conflict("duplicateUser"))
}

async fn create_then_panic(tx: MemoryTx) -> HttpResponse {
    let mut guard = tx.lock().await;
    if let Ok(conn) = guard.connection() {
        conn.upsert_user(user("Ada"));
    }
    panic!("handler exploded");
}

async fn commit_early(tx: MemoryTx) -> ApiResult<HttpResponse> {
    let mut scope = tx.lock().await;
    scope.connection()?.upsert_user(user("Linus"));
    scope.commit().await?;
    Ok(HttpResponse::Ok().finish())
}

async fn untransacted(tx: MemoryTx) -> ApiResult<HttpResponse> {
    drop(tx);
    Ok(HttpResponse::Ok().finish())
}

#[fixture]
fn db() -> MemoryDatabase {
    MemoryDatabase::default()
}

async fn call(db: &MemoryDatabase, req: test::TestRequest) -> (StatusCode, Value) {
    let transactional = Transactional::new(TransactionService::new(Arc::new(db.clone())));
    let app = test::init_service(
        App::new()
            .wrap(ExceptionFilter::new(Localizer::disabled()))
            .service(
                web::scope("/tx")
                    .wrap(transactional)
                    .route("/users/{name}", web::post().to(create))
                    .route("/fail", web::post().to(create_two_then_fail))
                    .route("/panic", web::post().to(create_then_panic))
                    .route("/early", web::post().to(commit_early)),
            )
            .route("/plain", web::get().to(untransacted)),
    )
    .await;
    let (status, body) = match app.call(req.to_request()).await {
        Ok(res) => (res.status(), test::read_body(res).await),
        Err(err) => {
            let res = err.error_response();
            let status = res.status();
            (status, to_bytes(res.into_body()).await.expect("error body"))
        }
    };
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("json body")
    };
    (status, json)
}

#[rstest]
#[actix_web::test]
async fn successful_handler_commits(db: MemoryDatabase) {
    let (status, _) = call(&db, test::TestRequest::post().uri("/tx/users/Ada")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(db.committed_users().len(), 1);
    assert_eq!(db.open_connections(), 0);
}

#[rstest]
#[actix_web::test]
async fn failing_handler_rolls_back_every_write(db: MemoryDatabase) {
    let (status, body) = call(&db, test::TestRequest::post().uri("/tx/fail")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "duplicateUser");
    assert!(db.committed_users().is_empty());
    assert_eq!(db.open_connections(), 0);
}

#[rstest]
#[actix_web::test]
async fn panicking_handler_rolls_back(db: MemoryDatabase) {
    let (status, body) = call(&db, test::TestRequest::post().uri("/tx/panic")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal server error");
    assert!(db.committed_users().is_empty());
    assert_eq!(db.open_connections(), 0);
}

#[rstest]
#[actix_web::test]
async fn commit_failure_becomes_a_server_error(db: MemoryDatabase) {
    db.fail_commits(true);
    let (status, body) = call(&db, test::TestRequest::post().uri("/tx/users/Ada")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["data"], Value::Null);
    assert!(db.committed_users().is_empty());
    assert_eq!(db.open_connections(), 0);
}

#[rstest]
#[actix_web::test]
async fn unavailable_database_fails_before_the_handler(db: MemoryDatabase) {
    db.fail_connects(true);
    let (status, _) = call(&db, test::TestRequest::post().uri("/tx/users/Ada")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(db.committed_users().is_empty());
}

#[rstest]
#[actix_web::test]
async fn manual_commit_inside_the_handler_is_respected(db: MemoryDatabase) {
    let (status, _) = call(&db, test::TestRequest::post().uri("/tx/early")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(db.committed_users().len(), 1);
    assert_eq!(db.open_connections(), 0);
}

#[rstest]
#[actix_web::test]
async fn extractor_outside_a_transactional_route_is_a_server_error(db: MemoryDatabase) {
    let (status, body) = call(&db, test::TestRequest::get().uri("/plain")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal server error");
}
