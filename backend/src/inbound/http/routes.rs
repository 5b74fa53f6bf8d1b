//! Route table.
//!
//! ```text
//! POST   /api/v1/login
//! POST   /api/v1/logout
//! GET    /api/v1/users          user:read
//! GET    /api/v1/users/{id}     user:read
//! DELETE /api/v1/users/{id}     user:delete, audited
//! GET    /api/v1/audit-logs     audit:read
//! GET    /health/ready          no envelope
//! GET    /health/live           no envelope
//! ```
//!
//! Each route carries its [`RoutePolicy`]. Handlers rely on
//! `web::Data<HttpState>`, `web::Data<HealthState>` and, for audited routes,
//! `web::Data<AuditTrail>` registered by the caller.
//!
//! [`AuditTrail`]: crate::middleware::AuditTrail

use actix_web::web;

use super::health;
use super::{audit_logs, auth, users};
use crate::domain::{AuditSpec, Permission};
use crate::middleware::RoutePolicy;

/// Register the API and health routes.
///
/// # Examples
/// ```
/// use actix_web::App;
/// use storefront::inbound::http::routes;
///
/// let app = App::new().configure(routes::configure);
/// ```
pub fn configure(cfg: &mut web::ServiceConfig) {
    let read_users = || RoutePolicy::new().require(Permission::UserRead);

    cfg.service(
        web::scope("/api/v1")
            .route("/login", web::post().to(auth::login))
            .route("/logout", web::post().to(auth::logout))
            .service(
                web::resource("/users")
                    .route(web::get().to(users::list_users).wrap(read_users())),
            )
            .service(
                web::resource("/users/{id}")
                    .route(web::get().to(users::get_user).wrap(read_users()))
                    .route(
                        web::delete().to(users::delete_user).wrap(
                            RoutePolicy::new()
                                .require(Permission::UserDelete)
                                .auditable(AuditSpec::new("delete", "user")),
                        ),
                    ),
            )
            .service(
                web::resource("/audit-logs").route(
                    web::get()
                        .to(audit_logs::list_audit_logs)
                        .wrap(RoutePolicy::new().require(Permission::AuditRead)),
                ),
            ),
    )
    .service(
        web::resource("/health/ready")
            .wrap(RoutePolicy::new().skip_transform())
            .route(web::get().to(health::ready)),
    )
    .service(
        web::resource("/health/live")
            .wrap(RoutePolicy::new().skip_transform())
            .route(web::get().to(health::live)),
    );
}

