//! Session-to-principal resolution.
//!
//! [`Authenticate`] reads the cookie session and stores the caller's
//! [`Principal`] in request extensions for the permission guard and the audit
//! interceptor. Anonymous requests pass through without one. It must sit
//! inside the session middleware.

use std::task::{Context, Poll};

use actix_session::SessionExt;
use actix_web::HttpMessage;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::{debug, warn};

use crate::inbound::http::session::SessionContext;

/// Principal resolution middleware.
#[derive(Clone, Copy, Debug, Default)]
pub struct Authenticate;

impl<S, B> Transform<S, ServiceRequest> for Authenticate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = AuthenticateMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticateMiddleware { service }))
    }
}

/// Service wrapper produced by [`Authenticate`].
pub struct AuthenticateMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthenticateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match SessionContext::new(req.get_session()).principal() {
            Ok(Some(principal)) => {
                debug!(principal = %principal.id(), "request authenticated");
                req.extensions_mut().insert(principal);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "session unreadable; treating request as anonymous"),
        }
        Box::pin(self.service.call(req))
    }
}
