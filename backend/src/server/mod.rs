//! Server construction and middleware wiring.
//!
//! App-wide middleware, outermost first: request identity, exception filter,
//! throttle, response envelope, cookie session and principal resolution.
//! Routes carry their own [`RoutePolicy`](crate::middleware::RoutePolicy).

mod config;
mod session_key;
mod state_builders;

pub use config::{AuditRetentionPolicy, RateLimit, ServerConfig};
pub use session_key::{
    BuildMode, SESSION_KEY_MIN_LEN, SessionConfigError, load_session_key, same_site_policy,
};
pub use state_builders::{Adapters, ProvisioningLoginService};

use std::sync::Arc;

use actix_session::{
    SessionMiddleware,
    config::{CookieContentSecurity, PersistentSession},
    storage::CookieSessionStore,
};
use actix_web::body::MessageBody;
use actix_web::cookie::{Key, SameSite};
use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
use mockable::{Clock, DefaultClock};
use tracing::info;

use crate::domain::{AuditDispatcher, AuditRetention, Localizer};
use crate::inbound::http::health::HealthState;
use crate::inbound::http::routes;
use crate::inbound::http::state::HttpState;
use crate::middleware::{
    AuditTrail, Authenticate, ExceptionFilter, FixedWindowLimiter, RequestIdentity,
    ResponseEnvelope, Throttle,
};
use crate::outbound::i18n::JsonCatalogue;

/// Everything one application instance needs.
#[derive(Clone)]
pub struct AppDependencies {
    pub health_state: web::Data<HealthState>,
    pub http_state: web::Data<HttpState>,
    pub audit_trail: web::Data<AuditTrail>,
    pub localizer: Localizer,
    pub throttle: Throttle,
    pub clock: Arc<dyn Clock>,
    pub key: Key,
    pub cookie_secure: bool,
    pub same_site: SameSite,
}

impl AppDependencies {
    /// Dependencies over `adapters` with the default rate limit, a secure
    /// `Lax` cookie and a fresh health state.
    pub fn new(adapters: &Adapters, localizer: Localizer, clock: Arc<dyn Clock>, key: Key) -> Self {
        let audit_trail = AuditTrail::new(
            AuditDispatcher::new(Arc::clone(&adapters.audit_sink)),
            Arc::clone(&clock),
        );
        Self {
            health_state: web::Data::new(HealthState::new()),
            http_state: web::Data::new(adapters.http_state()),
            audit_trail: web::Data::new(audit_trail),
            localizer,
            throttle: throttle(RateLimit::default(), &clock),
            clock,
            key,
            cookie_secure: true,
            same_site: SameSite::Lax,
        }
    }

    /// Replace the per-client request budget.
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.throttle = throttle(rate_limit, &self.clock);
        self
    }

    /// Share an existing health state.
    #[must_use]
    pub fn with_health_state(mut self, health_state: web::Data<HealthState>) -> Self {
        self.health_state = health_state;
        self
    }

    /// Session cookie attributes.
    #[must_use]
    pub fn with_cookie_policy(mut self, cookie_secure: bool, same_site: SameSite) -> Self {
        self.cookie_secure = cookie_secure;
        self.same_site = same_site;
        self
    }
}

fn throttle(rate_limit: RateLimit, clock: &Arc<dyn Clock>) -> Throttle {
    let limiter = FixedWindowLimiter::new(
        rate_limit.max_requests,
        rate_limit.window,
        Arc::clone(clock),
    );
    Throttle::new(Arc::new(limiter)).with_trusted_proxies(rate_limit.trusted_proxies)
}

fn session_middleware(
    key: Key,
    cookie_secure: bool,
    same_site: SameSite,
) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name("session".into())
        .cookie_path("/".into())
        .cookie_secure(cookie_secure)
        .cookie_http_only(true)
        .cookie_content_security(CookieContentSecurity::Private)
        .cookie_same_site(same_site)
        .session_lifecycle(
            PersistentSession::default().session_ttl(actix_web::cookie::time::Duration::hours(2)),
        )
        .build()
}

/// Assemble the application with the full middleware pipeline.
pub fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
        audit_trail,
        localizer,
        throttle,
        clock,
        key,
        cookie_secure,
        same_site,
    } = deps;

    // `wrap` order is innermost first.
    App::new()
        .app_data(health_state)
        .app_data(http_state)
        .app_data(audit_trail)
        .wrap(Authenticate)
        .wrap(session_middleware(key, cookie_secure, same_site))
        .wrap(ResponseEnvelope::new(clock))
        .wrap(throttle)
        .wrap(ExceptionFilter::new(localizer))
        .wrap(RequestIdentity)
        .configure(routes::configure)
}

/// Construct an Actix HTTP server using the provided health state and configuration.
///
/// Starts the audit retention schedule on the current runtime and marks the
/// server ready once the socket is bound.
///
/// # Errors
/// Propagates [`std::io::Error`] when the message catalogue is malformed or
/// binding the socket fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> std::io::Result<Server> {
    let ServerConfig {
        key,
        cookie_secure,
        same_site,
        bind_addr,
        db_pool,
        default_locale,
        rate_limit,
        audit_retention,
    } = config;

    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let adapters = Adapters::from_pool(db_pool.as_ref());
    let catalogue = JsonCatalogue::embedded()
        .map_err(|err| std::io::Error::other(format!("failed to load message catalogue: {err}")))?;
    let localizer = Localizer::new(Arc::new(catalogue), default_locale);
    let deps = AppDependencies::new(&adapters, localizer, Arc::clone(&clock), key)
        .with_rate_limit(rate_limit)
        .with_health_state(health_state.clone())
        .with_cookie_policy(cookie_secure, same_site);

    let server = HttpServer::new(move || build_app(deps.clone()))
        .bind(bind_addr)?
        .run();

    AuditRetention::new(
        Arc::clone(&adapters.audit_logs),
        clock,
        audit_retention.retention_days,
    )
    .spawn(audit_retention.purge_interval);
    info!(%bind_addr, "storefront server bound");

    health_state.mark_ready();
    Ok(server)
}

#[cfg(test)]
mod tests {
    //! Server bootstrap and readiness signalling.
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn health_state() -> web::Data<HealthState> {
        web::Data::new(HealthState::new())
    }

    #[rstest]
    #[actix_rt::test]
    async fn create_server_marks_ready(health_state: web::Data<HealthState>) {
        assert!(!health_state.is_ready(), "state should start unready");
        let addr = "127.0.0.1:0".parse().expect("addr");
        let config = ServerConfig::new(Key::generate(), false, SameSite::Lax, addr);

        let _server = create_server(health_state.clone(), config).expect("server should build");

        assert!(
            health_state.is_ready(),
            "server creation should mark readiness"
        );
    }
}
