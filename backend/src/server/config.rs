//! HTTP server configuration object and helpers.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use actix_web::cookie::{Key, SameSite};

use crate::outbound::persistence::DbPool;

/// Requests admitted per client within one window.
///
/// Clients are identified by peer address, or by the forwarded address when
/// the peer is listed in `trusted_proxies`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            trusted_proxies: Vec::new(),
        }
    }
}

/// How long audit records are kept and how often they are purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditRetentionPolicy {
    pub retention_days: u32,
    pub purge_interval: Duration,
}

impl Default for AuditRetentionPolicy {
    fn default() -> Self {
        Self {
            retention_days: 90,
            purge_interval: Duration::from_secs(3600),
        }
    }
}

/// Builder-style configuration for creating the HTTP server.
pub struct ServerConfig {
    pub(crate) key: Key,
    pub(crate) cookie_secure: bool,
    pub(crate) same_site: SameSite,
    pub(crate) bind_addr: SocketAddr,
    pub(crate) db_pool: Option<DbPool>,
    pub(crate) default_locale: String,
    pub(crate) rate_limit: RateLimit,
    pub(crate) audit_retention: AuditRetentionPolicy,
}

impl ServerConfig {
    /// Construct a server configuration using application preferences.
    #[must_use]
    pub fn new(key: Key, cookie_secure: bool, same_site: SameSite, bind_addr: SocketAddr) -> Self {
        Self {
            key,
            cookie_secure,
            same_site,
            bind_addr,
            db_pool: None,
            default_locale: "en".to_owned(),
            rate_limit: RateLimit::default(),
            audit_retention: AuditRetentionPolicy::default(),
        }
    }

    /// Attach a database connection pool for persistence adapters.
    ///
    /// Without one the server runs on in-memory adapters.
    #[must_use]
    pub fn with_db_pool(mut self, pool: DbPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    /// Locale used when a request names none the catalogue carries.
    #[must_use]
    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    /// Per-client request budget.
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Audit trail retention schedule.
    #[must_use]
    pub fn with_audit_retention(mut self, policy: AuditRetentionPolicy) -> Self {
        self.audit_retention = policy;
        self
    }

    /// Return the socket address the server will bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn builder_overrides_defaults() {
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("addr");
        let config = ServerConfig::new(Key::generate(), false, SameSite::Strict, addr)
            .with_default_locale("zh-CN")
            .with_rate_limit(RateLimit {
                max_requests: 3,
                window: Duration::from_secs(1),
                ..RateLimit::default()
            });

        assert_eq!(config.bind_addr(), addr);
        assert_eq!(config.default_locale, "zh-CN");
        assert_eq!(config.rate_limit.max_requests, 3);
        assert_eq!(config.audit_retention, AuditRetentionPolicy::default());
        assert!(config.db_pool.is_none());
    }
}
