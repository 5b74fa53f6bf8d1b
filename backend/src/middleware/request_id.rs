//! Middleware attaching a request-scoped correlation identifier.
//!
//! An inbound `x-request-id` header is honoured when it passes
//! [`RequestId::from_header`]; otherwise a UUID v4 is generated. The
//! identifier is stored in task-local scope and request extensions, and
//! echoed on every response, including errors raised by inner layers. Inner
//! services run inside the scope from their synchronous `call` onwards.

use std::task::{Context, Poll};

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::error::InternalError;
use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use actix_web::{Error, HttpMessage};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::{debug, error};

use crate::domain::RequestId;

/// Header carrying the correlation identifier in both directions.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Request id middleware.
///
/// Handlers can read the identifier via [`RequestId::current`] or from
/// request extensions.
///
/// # Examples
/// ```
/// use actix_web::App;
/// use storefront::middleware::RequestIdentity;
///
/// let app = App::new().wrap(RequestIdentity);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestIdentity;

impl<S, B> Transform<S, ServiceRequest> for RequestIdentity
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestIdentityMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestIdentityMiddleware { service }))
    }
}

/// Service wrapper produced by [`RequestIdentity`].
pub struct RequestIdentityMiddleware<S> {
    service: S,
}

fn inbound_request_id(req: &ServiceRequest) -> Option<RequestId> {
    req.headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(RequestId::from_header)
}

impl<S, B> Service<ServiceRequest> for RequestIdentityMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let request_id = inbound_request_id(&req).unwrap_or_else(RequestId::generate);
        debug!(
            request_id = %request_id,
            method = %req.method(),
            path = req.path(),
            "request received"
        );
        req.extensions_mut().insert(request_id.clone());

        let fut = RequestId::sync_scope(request_id.clone(), || self.service.call(req));
        Box::pin(RequestId::scope(request_id.clone(), async move {
            match fut.await {
                Ok(mut res) => {
                    echo(res.response_mut().headers_mut(), &request_id);
                    Ok(res)
                }
                Err(err) => {
                    let mut response = err.error_response();
                    echo(response.headers_mut(), &request_id);
                    Err(InternalError::from_response(err, response).into())
                }
            }
        }))
    }
}

fn echo(headers: &mut HeaderMap, request_id: &RequestId) {
    match HeaderValue::from_str(request_id.as_str()) {
        Ok(value) => {
            headers.insert(REQUEST_ID_HEADER, value);
        }
        Err(error) => {
            error!(%error, request_id = %request_id, "failed to encode request id header");
        }
    }
}
