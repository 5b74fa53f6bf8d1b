//! Global exception filter.
//!
//! Wraps the whole application and guarantees exactly one error envelope per
//! failed request. It intercepts:
//! - errors attached to responses, from handlers or from the framework;
//! - errors returned by inner middleware;
//! - bodiless `4xx`/`5xx` responses such as resource guard rejections;
//! - panics raised while building or polling the inner service future.
//!
//! Failures that arrive without a response (inner errors and panics) leave
//! the filter as an [`InternalError`] carrying the finished envelope.
//!
//! Classification and translation are delegated to
//! [`crate::domain::normalize`].

use std::panic::AssertUnwindSafe;
use std::task::{Context, Poll};
use std::time::Duration;

use actix_web::body::{BodySize, EitherBody, MessageBody};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::StatusCode;
use actix_web::http::header::{self, HeaderValue};
use actix_web::error::InternalError;
use actix_web::{HttpMessage, HttpRequest, HttpResponse, web};
use futures_util::FutureExt;
use futures_util::future::{LocalBoxFuture, Ready, ready};
use serde::Deserialize;

use crate::domain::normalize::{Caught, ErrorSite, normalize, panic_message};
use crate::domain::{ApiErrorResponse, Error, LocaleHints, Localizer, RequestId};

/// Header selecting the response language.
pub const LANG_HEADER: &str = "x-lang";

#[derive(Deserialize)]
struct LangQuery {
    lang: Option<String>,
}

/// Exception filter middleware.
///
/// # Examples
/// ```
/// use actix_web::App;
/// use storefront::domain::Localizer;
/// use storefront::middleware::ExceptionFilter;
///
/// let app = App::new().wrap(ExceptionFilter::new(Localizer::disabled()));
/// ```
#[derive(Clone, Debug)]
pub struct ExceptionFilter {
    localizer: Localizer,
}

impl ExceptionFilter {
    /// Filter translating messages through `localizer`.
    #[must_use]
    pub fn new(localizer: Localizer) -> Self {
        Self { localizer }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ExceptionFilter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = ExceptionFilterMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ExceptionFilterMiddleware {
            service,
            localizer: self.localizer.clone(),
        }))
    }
}

/// Service wrapper produced by [`ExceptionFilter`].
pub struct ExceptionFilterMiddleware<S> {
    service: S,
    localizer: Localizer,
}

impl<S, B> Service<ServiceRequest> for ExceptionFilterMiddleware<S>
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
        // The inner router needs sole ownership of the request head, so only
        // owned facts may outlive this call.
        let facts = RequestFacts::of(req.request());
        let localizer = self.localizer.clone();
        let called = std::panic::catch_unwind(AssertUnwindSafe(|| self.service.call(req)));

        Box::pin(async move {
            let outcome = match called {
                Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
                Err(panic) => Err(panic),
            };
            let response = match outcome {
                Ok(Ok(res)) => return Ok(inspect(res, &localizer)),
                Ok(Err(err)) => render_error(&facts, &localizer, &err),
                Err(panic) => render(
                    &facts,
                    &localizer,
                    Caught::Panic(panic_message(panic.as_ref())),
                ),
            };
            Err(InternalError::from_response(RENDERED, response).into())
        })
    }
}

fn render_error(
    facts: &RequestFacts,
    localizer: &Localizer,
    err: &actix_web::Error,
) -> HttpResponse {
    let caught = match err.as_error::<Error>() {
        Some(domain) => Caught::Domain(domain),
        None => Caught::Framework {
            status: err.as_response_error().status_code().as_u16(),
            message: err.to_string(),
        },
    };
    render(facts, localizer, caught)
}

/// Cause attached to envelopes that leave the filter as errors.
const RENDERED: &str = "failure rendered as an error envelope";

/// Request coordinates needed to render an envelope.
///
/// Captured up front because the request itself is consumed by the inner
/// service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFacts {
    request_id: Option<RequestId>,
    method: String,
    path: String,
    lang_query: Option<String>,
    lang_header: Option<String>,
    accept_language: Option<String>,
}

impl RequestFacts {
    /// Copy what rendering needs out of `req`.
    #[must_use]
    pub fn of(req: &HttpRequest) -> Self {
        let text = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        Self {
            request_id: req.extensions().get::<RequestId>().cloned(),
            method: req.method().as_str().to_owned(),
            path: req.path().to_owned(),
            lang_query: web::Query::<LangQuery>::from_query(req.query_string())
                .ok()
                .and_then(|q| q.into_inner().lang),
            lang_header: text(LANG_HEADER),
            accept_language: text(header::ACCEPT_LANGUAGE.as_str()),
        }
    }
}

fn inspect<B: MessageBody>(
    res: ServiceResponse<B>,
    localizer: &Localizer,
) -> ServiceResponse<EitherBody<B>> {
    let status = res.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return res.map_into_left_body();
    }

    let has_error = res.response().error().is_some();
    if !has_error && !is_bodiless(res.response().body().size()) {
        return res.map_into_left_body();
    }

    let caught = match res.response().error() {
        Some(err) => match err.as_error::<Error>() {
            Some(domain) => Caught::Domain(domain),
            None => Caught::Framework {
                status: status.as_u16(),
                message: err.to_string(),
            },
        },
        None => Caught::Framework {
            status: status.as_u16(),
            message: String::new(),
        },
    };
    let response = render(&RequestFacts::of(res.request()), localizer, caught);
    res.into_response(response).map_into_right_body()
}

fn is_bodiless(size: BodySize) -> bool {
    matches!(size, BodySize::None | BodySize::Sized(0))
}

/// Render `caught` as an error envelope response for the request described
/// by `facts`.
#[must_use]
pub fn render(facts: &RequestFacts, localizer: &Localizer, caught: Caught<'_>) -> HttpResponse {
    let retry_after = match &caught {
        Caught::Domain(Error::RateLimited { retry_after }) => *retry_after,
        _ => None,
    };
    let context = localizer.context(LocaleHints {
        query: facts.lang_query.as_deref(),
        header: facts.lang_header.as_deref(),
        accept_language: facts.accept_language.as_deref(),
    });
    let site = ErrorSite {
        request_id: facts.request_id.as_ref(),
        method: &facts.method,
        path: &facts.path,
    };
    let body = normalize(caught, context.as_ref(), &site);
    envelope_response(&body, retry_after)
}

/// Build the HTTP response carrying `body`; its status equals `body.code`.
#[must_use]
pub fn envelope_response(body: &ApiErrorResponse, retry_after: Option<Duration>) -> HttpResponse {
    let status = StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = HttpResponse::build(status);
    if let Some(delay) = retry_after {
        let secs = delay.as_secs().max(1);
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            builder.insert_header((header::RETRY_AFTER, value));
        }
    }
    builder.json(body)
}

#[cfg(test)]
mod tests;
