//! Response interceptor wrapping successful bodies into the success envelope.
//!
//! Only `2xx` responses other than `204` are considered. JSON bodies are
//! wrapped as-is, `text/plain` bodies as a JSON string and empty bodies as
//! `null`. Streams, other content types and responses marked with
//! [`SkipTransform`] pass through untouched. Status codes are never altered.

use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::body::{self, BodySize, EitherBody, MessageBody};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::StatusCode;
use actix_web::http::header::{self, HeaderValue};
use actix_web::{HttpMessage, web};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use mockable::Clock;
use serde_json::Value;

use crate::domain::{Error, envelope};

/// Marker disabling the envelope for one request.
///
/// Insert it into request or response extensions; [`RoutePolicy`] does so
/// for routes declared with `skip_transform`.
///
/// [`RoutePolicy`]: crate::middleware::RoutePolicy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipTransform;

/// Success envelope middleware.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use actix_web::App;
/// use mockable::DefaultClock;
/// use storefront::middleware::ResponseEnvelope;
///
/// let app = App::new().wrap(ResponseEnvelope::new(Arc::new(DefaultClock)));
/// ```
#[derive(Clone)]
pub struct ResponseEnvelope {
    clock: Arc<dyn Clock>,
}

impl ResponseEnvelope {
    /// Envelope stamping timestamps from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ResponseEnvelope
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = ResponseEnvelopeMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ResponseEnvelopeMiddleware {
            service,
            clock: Arc::clone(&self.clock),
        }))
    }
}

/// Service wrapper produced by [`ResponseEnvelope`].
pub struct ResponseEnvelopeMiddleware<S> {
    service: S,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Text,
    Empty,
}

fn body_kind<B: MessageBody>(res: &ServiceResponse<B>) -> Option<BodyKind> {
    let status = res.status();
    if !status.is_success() || status == StatusCode::NO_CONTENT {
        return None;
    }
    if res.request().extensions().contains::<SkipTransform>()
        || res.response().extensions().contains::<SkipTransform>()
    {
        return None;
    }
    let size = res.response().body().size();
    if matches!(size, BodySize::Stream) {
        return None;
    }
    let content_type = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase());
    match content_type.as_deref() {
        Some("application/json") => Some(BodyKind::Json),
        Some(mime) if mime.ends_with("+json") => Some(BodyKind::Json),
        Some("text/plain") => Some(BodyKind::Text),
        None if matches!(size, BodySize::None | BodySize::Sized(0)) => Some(BodyKind::Empty),
        None => Some(BodyKind::Text),
        Some(_) => None,
    }
}

fn decode(kind: BodyKind, bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    match kind {
        BodyKind::Json => serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
        BodyKind::Text | BodyKind::Empty => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl<S, B> Service<ServiceRequest> for ResponseEnvelopeMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let clock = Arc::clone(&self.clock);
        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            let Some(kind) = body_kind(&res) else {
                return Ok(res.map_into_left_body());
            };

            let (req, res) = res.into_parts();
            let (head, body) = res.into_parts();
            let bytes = body::to_bytes(body).await.map_err(|err| {
                let err: Box<dyn std::error::Error> = err.into();
                Error::internal(format!("reading response body failed: {err}"))
            })?;
            let wrapped = envelope::wrap(decode(kind, &bytes), clock.as_ref());
            let payload = serde_json::to_vec(&wrapped)
                .map_err(|err| Error::from_source("serialising envelope failed", err))?;

            let mut res = head.set_body(web::Bytes::from(payload));
            let headers = res.headers_mut();
            headers.remove(header::CONTENT_LENGTH);
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            Ok(ServiceResponse::new(req, res)
                .map_into_boxed_body()
                .map_into_right_body())
        })
    }
}

#[cfg(test)]
mod tests {
    //! Wrapping rules for the success envelope.
    use super::*;
    use actix_web::{App, HttpRequest, HttpResponse, test, web};
    use chrono::{TimeZone, Utc};
    use mockable::MockClock;
    use serde_json::json;

    const NOW_MS: i64 = 1_767_225_600_000;

    fn clock() -> Arc<dyn Clock> {
        let mut clock = MockClock::new();
        clock
            .expect_utc()
            .returning(|| Utc.timestamp_millis_opt(NOW_MS).single().expect("instant"));
        Arc::new(clock)
    }

    async fn call(route: actix_web::Route) -> (StatusCode, Option<String>, web::Bytes) {
        let app = test::init_service(
            App::new()
                .wrap(ResponseEnvelope::new(clock()))
                .route("/", route),
        )
        .await;
        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        let status = res.status();
        let content_type = res
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        (status, content_type, test::read_body(res).await)
    }

    fn json_of(bytes: &web::Bytes) -> Value {
        serde_json::from_slice(bytes).expect("json body")
    }

    #[actix_web::test]
    async fn wraps_json_bodies() {
        let (status, content_type, body) =
            call(web::get().to(|| async { HttpResponse::Ok().json(json!({"id": 1})) })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(
            json_of(&body),
            json!({"code": 200, "message": "success", "data": {"id": 1}, "timestamp": NOW_MS})
        );
    }

    #[actix_web::test]
    async fn keeps_non_200_success_statuses() {
        let (status, _, body) =
            call(web::get().to(|| async { HttpResponse::Created().json(json!(["a"])) })).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json_of(&body)["data"], json!(["a"]));
    }

    #[actix_web::test]
    async fn wraps_text_and_empty_bodies() {
        let (_, _, text) = call(web::get().to(|| async { "pong" })).await;
        assert_eq!(json_of(&text)["data"], json!("pong"));

        let (_, _, empty) = call(web::get().to(|| async { HttpResponse::Ok().finish() })).await;
        assert_eq!(json_of(&empty)["data"], Value::Null);
    }

    #[actix_web::test]
    async fn envelope_shaped_results_pass_unchanged() {
        let already = json!({"code": 200, "message": "success", "data": 5, "timestamp": 1});
        let expected = already.clone();
        let (_, _, body) = call(web::get().to(move || {
            let already = already.clone();
            async move { HttpResponse::Ok().json(already) }
        }))
        .await;
        assert_eq!(json_of(&body), expected);
    }

    #[actix_web::test]
    async fn skips_marked_requests() {
        async fn handler(req: HttpRequest) -> HttpResponse {
            req.extensions_mut().insert(SkipTransform);
            HttpResponse::Ok().json(json!({"raw": true}))
        }
        let (_, _, body) = call(web::get().to(handler)).await;
        assert_eq!(json_of(&body), json!({"raw": true}));
    }

    #[actix_web::test]
    async fn leaves_errors_redirects_and_binary_alone() {
        let (status, _, body) =
            call(web::get().to(|| async { HttpResponse::NotFound().json(json!({"x": 1})) })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_of(&body), json!({"x": 1}));

        let (status, _, body) = call(web::get().to(|| async {
            HttpResponse::Found()
                .insert_header((header::LOCATION, "/elsewhere"))
                .finish()
        }))
        .await;
        assert_eq!(status, StatusCode::FOUND);
        assert!(body.is_empty());

        let (_, content_type, body) = call(web::get().to(|| async {
            HttpResponse::Ok()
                .content_type("application/octet-stream")
                .body(vec![0_u8, 159, 146, 150])
        }))
        .await;
        assert_eq!(content_type.as_deref(), Some("application/octet-stream"));
        assert_eq!(body.as_ref(), &[0_u8, 159, 146, 150]);
    }

    #[actix_web::test]
    async fn no_content_is_not_wrapped() {
        let (status, _, body) =
            call(web::get().to(|| async { HttpResponse::NoContent().finish() })).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }
}
