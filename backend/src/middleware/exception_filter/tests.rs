//! Envelope rendering for every failure source.

use std::sync::Arc;

use actix_web::body::{MessageBody, to_bytes};
use actix_web::dev::ServiceFactory;
use actix_web::{App, HttpResponse, test};
use rstest::rstest;
use serde_json::{Value, json};

use super::*;
use crate::domain::ports::MockTranslator;
use crate::middleware::RequestIdentity;

fn translator() -> MockTranslator {
    let mut translator = MockTranslator::new();
    translator
        .expect_supports()
        .returning(|locale| matches!(locale, "en" | "zh-CN"));
    translator
        .expect_locales()
        .returning(|| vec!["en".to_owned(), "zh-CN".to_owned()]);
    translator
        .expect_lookup()
        .returning(|key, locale| match (key, locale) {
            ("userNotFound", "zh-CN") => Some("用户不存在".to_owned()),
            ("userNotFound", _) => Some("User not found".to_owned()),
            ("internalServerError", "zh-CN") => Some("服务器内部错误".to_owned()),
            ("methodNotAllowed", "zh-CN") => Some("方法不允许".to_owned()),
            _ => None,
        });
    translator
}

async fn missing_user() -> Result<HttpResponse, Error> {
    Err(Error::not_found("userNotFound"))
}

async fn exploding() -> HttpResponse {
    panic!("secret detail that must not leak");
}

async fn internal() -> Result<HttpResponse, Error> {
    Err(Error::internal("connection string postgres://u:p@db"))
}

async fn limited() -> Result<HttpResponse, Error> {
    Err(Error::too_many_requests(Some(Duration::from_secs(12))))
}

async fn ok() -> HttpResponse {
    HttpResponse::Ok().json(json!({"fine": true}))
}

async fn bare_teapot() -> HttpResponse {
    HttpResponse::build(StatusCode::IM_A_TEAPOT).finish()
}

async fn custom_body_conflict() -> HttpResponse {
    HttpResponse::Conflict().json(json!({"handled": "locally"}))
}

#[derive(serde::Deserialize)]
#[expect(dead_code, reason = "only deserialised to trigger extractor errors")]
struct Payload {
    name: String,
}

async fn takes_json(_body: web::Json<Payload>) -> HttpResponse {
    HttpResponse::Ok().finish()
}

fn app(
    localizer: Localizer,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .wrap(ExceptionFilter::new(localizer))
        .wrap(RequestIdentity)
        .route("/missing", web::get().to(missing_user))
        .route("/boom", web::get().to(exploding))
        .route("/internal", web::get().to(internal))
        .route("/limited", web::get().to(limited))
        .route("/ok", web::get().to(ok))
        .route("/teapot", web::get().to(bare_teapot))
        .route("/conflict", web::get().to(custom_body_conflict))
        .route("/json", web::post().to(takes_json))
}

fn translated() -> Localizer {
    Localizer::new(Arc::new(translator()), "en")
}

async fn respond(
    localizer: Localizer,
    req: test::TestRequest,
) -> (StatusCode, header::HeaderMap, Value) {
    let svc = test::init_service(app(localizer)).await;
    match svc.call(req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let headers = res.headers().clone();
            (status, headers, test::read_body_json(res).await)
        }
        Err(err) => {
            let res = err.error_response();
            let status = res.status();
            let headers = res.headers().clone();
            let bytes = to_bytes(res.into_body()).await.expect("error body");
            let body = serde_json::from_slice(&bytes).expect("json envelope");
            (status, headers, body)
        }
    }
}

async fn call(localizer: Localizer, req: test::TestRequest) -> (StatusCode, Value) {
    let (status, _, body) = respond(localizer, req).await;
    (status, body)
}

#[rstest]
#[case(test::TestRequest::get().uri("/missing"), "User not found")]
#[case(test::TestRequest::get().uri("/missing?lang=zh-CN"), "用户不存在")]
#[case(
    test::TestRequest::get().uri("/missing").insert_header(("x-lang", "zh-CN")),
    "用户不存在"
)]
#[case(
    test::TestRequest::get()
        .uri("/missing")
        .insert_header(("accept-language", "zh-CN,zh;q=0.9")),
    "用户不存在"
)]
#[case(test::TestRequest::get().uri("/missing?lang=fr"), "User not found")]
#[actix_web::test]
async fn domain_errors_are_translated(#[case] req: test::TestRequest, #[case] expected: &str) {
    let (status, body) = call(translated(), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"code": 404, "message": expected, "data": null}));
}

#[actix_web::test]
async fn untranslated_keys_fall_back_to_the_literal() {
    let (_, body) = call(Localizer::disabled(), test::TestRequest::get().uri("/missing")).await;
    assert_eq!(body["message"], "userNotFound");
}

#[actix_web::test]
async fn panics_become_generic_server_errors() {
    let (status, body) = call(Localizer::disabled(), test::TestRequest::get().uri("/boom")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"code": 500, "message": "Internal server error", "data": null})
    );
}

#[actix_web::test]
async fn internal_faults_never_leak_detail() {
    let (status, body) = call(
        translated(),
        test::TestRequest::get().uri("/internal?lang=zh-CN"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "服务器内部错误");
    assert!(!body.to_string().contains("postgres"));
}

#[actix_web::test]
async fn unmatched_routes_render_not_found() {
    let (status, body) =
        call(Localizer::disabled(), test::TestRequest::get().uri("/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Resource not found");
}

#[actix_web::test]
async fn bodiless_method_rejections_are_enveloped() {
    let (status, body) = call(
        translated(),
        test::TestRequest::delete().uri("/ok?lang=zh-CN"),
    )
    .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body, json!({"code": 405, "message": "方法不允许", "data": null}));
}

#[actix_web::test]
async fn unknown_client_statuses_use_the_generic_fallback() {
    let (status, body) = call(Localizer::disabled(), test::TestRequest::get().uri("/teapot")).await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body, json!({"code": 418, "message": "Request failed", "data": null}));
}

#[actix_web::test]
async fn framework_extractor_errors_keep_their_status() {
    let (status, body) = call(
        Localizer::disabled(),
        test::TestRequest::post()
            .uri("/json")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(body["data"], Value::Null);
    assert!(body["message"].is_string());
}

#[actix_web::test]
async fn rate_limits_render_429_with_retry_after() {
    let svc = test::init_service(app(Localizer::disabled())).await;
    let res = test::call_service(&svc, test::TestRequest::get().uri("/limited").to_request()).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        res.headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
        Some("12")
    );
    let body: Value = test::read_body_json(res).await;
    assert_eq!(
        body,
        json!({"code": 429, "message": "Too many requests, please try again later", "data": null})
    );
}

#[rstest]
#[case("/ok", StatusCode::OK, json!({"fine": true}))]
#[case("/conflict", StatusCode::CONFLICT, json!({"handled": "locally"}))]
#[actix_web::test]
async fn responses_without_errors_pass_through(
    #[case] path: &str,
    #[case] status: StatusCode,
    #[case] expected: Value,
) {
    let (actual_status, body) =
        call(Localizer::disabled(), test::TestRequest::get().uri(path)).await;
    assert_eq!(actual_status, status);
    assert_eq!(body, expected);
}

#[actix_web::test]
async fn request_id_survives_error_rendering() {
    let req = test::TestRequest::get()
        .uri("/boom")
        .insert_header(("x-request-id", "trace-me"));
    let (status, headers, _) = respond(Localizer::disabled(), req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        headers.get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("trace-me")
    );
}

#[actix_web::test]
async fn panics_leave_the_filter_as_rendered_errors() {
    let svc = test::init_service(
        App::new()
            .wrap(ExceptionFilter::new(Localizer::disabled()))
            .route("/boom", web::get().to(exploding)),
    )
    .await;
    let err = svc
        .call(test::TestRequest::get().uri("/boom").to_request())
        .await
        .expect_err("no response survives a panic");
    assert!(err.as_error::<Error>().is_none());
    assert_eq!(err.error_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[rstest]
#[case("/missing", StatusCode::NOT_FOUND)]
#[case("/ok", StatusCode::OK)]
#[actix_web::test]
async fn routed_requests_reach_their_handlers(#[case] path: &str, #[case] expected: StatusCode) {
    let svc = test::init_service(app(Localizer::disabled())).await;
    let res = test::call_service(&svc, test::TestRequest::get().uri(path).to_request()).await;
    assert_eq!(res.status(), expected);
}

#[actix_web::test]
async fn facts_outlive_the_request_they_describe() {
    let req = test::TestRequest::get()
        .uri("/orders?lang=zh-CN")
        .insert_header(("accept-language", "en"))
        .to_http_request();
    req.extensions_mut()
        .insert(RequestId::from_header("facts-1").expect("valid id"));

    let facts = RequestFacts::of(&req);
    drop(req);

    let rendered = render(
        &facts,
        &translated(),
        Caught::Domain(&Error::not_found("userNotFound")),
    );
    assert_eq!(rendered.status(), StatusCode::NOT_FOUND);
    let bytes = to_bytes(rendered.into_body()).await.expect("body");
    let body: Value = serde_json::from_slice(&bytes).expect("json envelope");
    assert_eq!(body["message"], "用户不存在");
}
