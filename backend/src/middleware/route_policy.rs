//! Per-route policy: required permissions, audit marker and envelope opt-out.
//!
//! A [`RoutePolicy`] is attached to a resource at registration time with
//! `.wrap(...)`. It runs after routing, so path parameters are available to
//! the audit marker, and inside the app-wide envelope, so an audited response
//! body is the raw handler output.

use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::body::{self, EitherBody, MessageBody};
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header;
use actix_web::{HttpMessage, web};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use mockable::Clock;
use tracing::{debug, warn};

use super::SkipTransform;
use crate::domain::{
    AuditDispatcher, AuditInput, AuditSpec, Error, Permission, PermissionGuard, PermissionSet,
    Principal, RequestId,
};

/// Audit collaborators shared through application data.
///
/// Register with `App::app_data(web::Data::new(trail))`; auditable routes
/// without it log a warning and write nothing.
#[derive(Clone)]
pub struct AuditTrail {
    dispatcher: AuditDispatcher,
    clock: Arc<dyn Clock>,
}

impl AuditTrail {
    /// Trail dispatching through `dispatcher`, stamped by `clock`.
    pub fn new(dispatcher: AuditDispatcher, clock: Arc<dyn Clock>) -> Self {
        Self { dispatcher, clock }
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail").finish_non_exhaustive()
    }
}

/// Route metadata evaluated around a handler.
///
/// # Examples
/// ```
/// use actix_web::{web, App, HttpResponse};
/// use storefront::domain::{AuditSpec, Permission};
/// use storefront::middleware::RoutePolicy;
///
/// let app = App::new().service(
///     web::resource("/users/{id}")
///         .wrap(
///             RoutePolicy::new()
///                 .require(Permission::UserDelete)
///                 .auditable(AuditSpec::new("delete", "user")),
///         )
///         .route(web::delete().to(HttpResponse::NoContent)),
/// );
/// ```
#[derive(Clone, Debug, Default)]
pub struct RoutePolicy {
    required: PermissionSet,
    audit: Option<AuditSpec>,
    skip_transform: bool,
}

impl RoutePolicy {
    /// Policy allowing everyone, auditing nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `permission` in addition to those already required.
    #[must_use]
    pub fn require(mut self, permission: Permission) -> Self {
        self.required.insert(permission);
        self
    }

    /// Require every permission in `permissions`.
    #[must_use]
    pub fn require_all(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.required.extend(permissions);
        self
    }

    /// Write an audit record after each successful call.
    #[must_use]
    pub fn auditable(mut self, spec: AuditSpec) -> Self {
        self.audit = Some(spec);
        self
    }

    /// Return the handler output without the success envelope.
    #[must_use]
    pub fn skip_transform(mut self) -> Self {
        self.skip_transform = true;
        self
    }

    /// Permissions a caller must own.
    #[must_use]
    pub fn required(&self) -> &PermissionSet {
        &self.required
    }
}

impl<S, B> Transform<S, ServiceRequest> for RoutePolicy
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = RoutePolicyMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RoutePolicyMiddleware {
            service: Rc::new(service),
            policy: Rc::new(self.clone()),
        }))
    }
}

/// Service wrapper produced by [`RoutePolicy`].
pub struct RoutePolicyMiddleware<S> {
    service: Rc<S>,
    policy: Rc<RoutePolicy>,
}

fn payload_from(bytes: web::Bytes) -> Payload {
    let (_, mut payload) = actix_http::h1::Payload::create(true);
    payload.unread_data(bytes);
    Payload::from(payload)
}

struct Captured {
    actor: Option<Principal>,
    entity_id: Option<String>,
    request_body: Option<web::Bytes>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    request_id: Option<RequestId>,
}

async fn capture(req: &mut ServiceRequest, spec: &AuditSpec) -> Result<Captured, actix_web::Error> {
    let request_body = if spec.needs_request_body() {
        let bytes = req.extract::<web::Bytes>().await?;
        req.set_payload(payload_from(bytes.clone()));
        Some(bytes)
    } else {
        None
    };
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let ip_address = req.connection_info().realip_remote_addr().map(str::to_owned);
    let extensions = req.extensions();
    Ok(Captured {
        actor: extensions.get::<Principal>().cloned(),
        entity_id: req.match_info().get(spec.id_param()).map(str::to_owned),
        request_body,
        ip_address,
        user_agent,
        request_id: extensions.get::<RequestId>().cloned(),
    })
}

impl<S, B> Service<ServiceRequest> for RoutePolicyMiddleware<S>
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

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let policy = Rc::clone(&self.policy);

        Box::pin(async move {
            if policy.skip_transform {
                req.extensions_mut().insert(SkipTransform);
            }
            let principal = req.extensions().get::<Principal>().cloned();
            if let Err(err) = PermissionGuard::default().check(&policy.required, principal.as_ref())
            {
                return Ok(req.error_response(err).map_into_right_body());
            }

            let Some(spec) = policy.audit.as_ref() else {
                return Ok(service.call(req).await?.map_into_left_body());
            };
            let trail = req.app_data::<web::Data<AuditTrail>>().cloned();
            let captured = capture(&mut req, spec).await?;

            let res = match service.call(req).await {
                Ok(res) => res,
                Err(err) => {
                    debug!(action = spec.action(), error = %err, "handler failed; no audit record");
                    return Err(err);
                }
            };
            if !res.status().is_success() || res.response().error().is_some() {
                debug!(
                    action = spec.action(),
                    status = res.status().as_u16(),
                    "handler failed; no audit record"
                );
                return Ok(res.map_into_left_body());
            }
            let Some(trail) = trail else {
                warn!(action = spec.action(), "auditable route without an audit trail");
                return Ok(res.map_into_left_body());
            };

            let (res, response_body) = if spec.includes_response() {
                let (http_req, response) = res.into_parts();
                let (head, body) = response.into_parts();
                let bytes = body::to_bytes(body).await.map_err(|err| {
                    let err: Box<dyn std::error::Error> = err.into();
                    Error::internal(format!("reading audited response failed: {err}"))
                })?;
                let rebuilt = ServiceResponse::new(http_req, head.set_body(bytes.clone()))
                    .map_into_boxed_body()
                    .map_into_right_body();
                (rebuilt, Some(bytes))
            } else {
                (res.map_into_left_body(), None)
            };

            let record = spec.record(
                AuditInput {
                    actor: captured.actor.as_ref(),
                    entity_id: captured.entity_id.as_deref(),
                    request_body: captured.request_body.as_deref(),
                    response_body: response_body.as_deref(),
                    ip_address: captured.ip_address.as_deref(),
                    user_agent: captured.user_agent.as_deref(),
                    request_id: captured.request_id.as_ref(),
                },
                trail.clock.as_ref(),
            );
            trail.dispatcher.dispatch(record);
            Ok(res)
        })
    }
}
