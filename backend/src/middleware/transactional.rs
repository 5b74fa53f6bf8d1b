//! Request-scoped transactions.
//!
//! [`Transactional`] wraps a resource so its handler runs inside one
//! transaction. The handler reaches the open connection through the [`Tx`]
//! extractor. A `2xx` or `3xx` response commits; anything else, including a
//! panic, rolls back. A failed commit replaces the response with a `500`.

use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{FromRequest, HttpMessage, HttpRequest};
use futures_util::FutureExt;
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::domain::ports::ConnectionSource;
use crate::domain::{Error, TransactionScope, TransactionService};

/// Handle to the transaction opened for the current request.
///
/// # Examples
/// ```
/// use actix_web::HttpResponse;
/// use storefront::domain::ApiResult;
/// use storefront::middleware::Tx;
/// use storefront::outbound::memory::MemoryDatabase;
///
/// async fn count(tx: Tx<MemoryDatabase>) -> ApiResult<HttpResponse> {
///     let mut scope = tx.lock().await;
///     let users = scope.connection()?.users();
///     Ok(HttpResponse::Ok().json(users.len()))
/// }
/// ```
pub struct Tx<S: ConnectionSource> {
    scope: Arc<Mutex<TransactionScope<S>>>,
}

impl<S: ConnectionSource> Clone for Tx<S> {
    fn clone(&self) -> Self {
        Self {
            scope: Arc::clone(&self.scope),
        }
    }
}

impl<S: ConnectionSource> Tx<S> {
    fn new(scope: TransactionScope<S>) -> Self {
        Self {
            scope: Arc::new(Mutex::new(scope)),
        }
    }

    /// Exclusive access to the request's transaction scope.
    pub async fn lock(&self) -> MutexGuard<'_, TransactionScope<S>> {
        self.scope.lock().await
    }
}

impl<S: ConnectionSource> FromRequest for Tx<S> {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(req.extensions().get::<Self>().cloned().ok_or_else(|| {
            Error::internal("transaction handle requested outside a transactional route")
        }))
    }
}

/// Middleware opening one transaction per request.
pub struct Transactional<S> {
    transactions: TransactionService<S>,
}

impl<S> Clone for Transactional<S> {
    fn clone(&self) -> Self {
        Self {
            transactions: self.transactions.clone(),
        }
    }
}

impl<S: ConnectionSource> Transactional<S> {
    /// Middleware drawing transactions from `transactions`.
    pub fn new(transactions: TransactionService<S>) -> Self {
        Self { transactions }
    }
}

impl<Svc, B, S> Transform<Svc, ServiceRequest> for Transactional<S>
where
    Svc: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>
        + 'static,
    Svc::Future: 'static,
    B: MessageBody + 'static,
    S: ConnectionSource,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = TransactionalMiddleware<Svc, S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: Svc) -> Self::Future {
        ready(Ok(TransactionalMiddleware {
            service: Rc::new(service),
            transactions: self.transactions.clone(),
        }))
    }
}

/// Service wrapper produced by [`Transactional`].
pub struct TransactionalMiddleware<Svc, S> {
    service: Rc<Svc>,
    transactions: TransactionService<S>,
}

fn keeps_work<B>(outcome: &Result<ServiceResponse<B>, actix_web::Error>) -> bool {
    match outcome {
        Ok(res) => {
            let status = res.status();
            (status.is_success() || status.is_redirection()) && res.response().error().is_none()
        }
        Err(_) => false,
    }
}

async fn discard<S: ConnectionSource>(scope: &mut TransactionScope<S>) {
    if !scope.is_active() {
        return;
    }
    if let Err(err) = scope.rollback().await {
        warn!(error = %err, "request rollback failed");
    }
}

impl<Svc, B, S> Service<ServiceRequest> for TransactionalMiddleware<Svc, S>
where
    Svc: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>
        + 'static,
    Svc::Future: 'static,
    B: MessageBody + 'static,
    S: ConnectionSource,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let transactions = self.transactions.clone();

        Box::pin(async move {
            let mut scope = transactions.scope();
            if let Err(err) = scope.start_transaction().await {
                return Ok(req.error_response(Error::from(err)).map_into_right_body());
            }
            let tx = Tx::new(scope);
            req.extensions_mut().insert(tx.clone());

            let outcome = AssertUnwindSafe(service.call(req)).catch_unwind().await;
            let mut scope = tx.lock().await;
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(panic) => {
                    discard(&mut scope).await;
                    drop(scope);
                    std::panic::resume_unwind(panic)
                }
            };

            if !keeps_work(&outcome) {
                discard(&mut scope).await;
                return outcome.map(ServiceResponse::map_into_left_body);
            }
            let res = outcome?;
            if scope.is_active() {
                if let Err(err) = scope.commit().await {
                    let (http_req, _) = res.into_parts();
                    let failed = ServiceResponse::from_err(Error::from(err), http_req);
                    return Ok(failed.map_into_right_body());
                }
            }
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests;
