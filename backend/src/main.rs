//! Storefront entry-point: loads configuration and runs the HTTP server.

use actix_web::web;
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use storefront::inbound::http::health::HealthState;
use storefront::outbound::persistence::{DbPool, PoolConfig};
use storefront::server::{
    AuditRetentionPolicy, BuildMode, RateLimit, ServerConfig, create_server, load_session_key,
    same_site_policy,
};
use storefront::StorefrontSettings;

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = StorefrontSettings::load_from_iter(std::env::args_os())
        .map_err(|e| std::io::Error::other(format!("failed to load configuration: {e}")))?;
    let mode = BuildMode::from_debug_assertions();
    let key = load_session_key(
        &settings.session_key_file(),
        settings.session_allow_ephemeral,
        mode,
    )
    .map_err(std::io::Error::other)?;
    let same_site = same_site_policy(
        settings.session_same_site.as_deref(),
        settings.cookie_secure,
        mode,
    )
    .map_err(std::io::Error::other)?;

    let trusted_proxies = settings
        .trusted_proxies()
        .map_err(|e| std::io::Error::other(format!("invalid trusted proxy address: {e}")))?;

    let mut config = ServerConfig::new(key, settings.cookie_secure, same_site, settings.bind_addr())
        .with_default_locale(settings.default_locale())
        .with_rate_limit(RateLimit {
            max_requests: settings.rate_limit_max,
            window: settings.rate_limit_window(),
            trusted_proxies,
        })
        .with_audit_retention(AuditRetentionPolicy {
            retention_days: settings.audit_retention_days,
            purge_interval: settings.audit_retention_interval(),
        });

    if let Some(url) = settings.database_url.as_deref() {
        let pool_config = PoolConfig::new(url)
            .with_max_connections(settings.db_max_connections)
            .with_min_idle(settings.db_min_idle)
            .with_checkout_timeout(settings.db_checkout_timeout());
        let pool = DbPool::new(pool_config)
            .await
            .map_err(|e| std::io::Error::other(format!("failed to create database pool: {e}")))?;
        config = config.with_db_pool(pool);
        info!("database pool ready");
    }

    let health_state = web::Data::new(HealthState::new());
    create_server(health_state, config)?.await
}
