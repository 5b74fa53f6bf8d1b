//! Process configuration loaded via OrthoConfig.
//!
//! Values come from CLI flags, `STOREFRONT_*` environment variables and the
//! configuration file, in that order of precedence.

use std::net::{AddrParseError, IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
const DEFAULT_LOCALE: &str = "en";
const DEFAULT_SESSION_KEY_FILE: &str = "/var/run/secrets/session_key";

/// Configuration values for the storefront server.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "STOREFRONT")]
pub struct StorefrontSettings {
    /// Interface to bind.
    pub host: Option<IpAddr>,
    /// Port to bind.
    #[ortho_config(default = 8080)]
    pub port: u16,
    /// PostgreSQL URL; in-memory adapters are used when absent.
    pub database_url: Option<String>,
    /// Upper bound on pooled database connections.
    #[ortho_config(default = 10)]
    pub db_max_connections: u32,
    /// Idle connections kept open.
    pub db_min_idle: Option<u32>,
    /// Seconds to wait for a pooled connection.
    #[ortho_config(default = 30)]
    pub db_checkout_timeout_secs: u64,
    /// Locale used when a request names none the catalogue carries.
    pub default_locale: Option<String>,
    /// Requests admitted per client and window.
    #[ortho_config(default = 100)]
    pub rate_limit_max: u32,
    /// Rate-limit window length in seconds.
    #[ortho_config(default = 60)]
    pub rate_limit_window_secs: u64,
    /// Comma-separated proxy addresses whose `Forwarded`/`X-Forwarded-For`
    /// headers identify the client.
    pub trusted_proxies: Option<String>,
    /// Days audit records are kept.
    #[ortho_config(default = 90)]
    pub audit_retention_days: u32,
    /// Seconds between retention purges.
    #[ortho_config(default = 3600)]
    pub audit_retention_interval_secs: u64,
    /// File holding the session signing key.
    pub session_key_file: Option<PathBuf>,
    /// Allow a generated session key when the key file is unreadable.
    #[ortho_config(default = false)]
    pub session_allow_ephemeral: bool,
    /// Mark the session cookie `Secure`.
    #[ortho_config(default = true)]
    pub cookie_secure: bool,
    /// Session cookie `SameSite` policy: `Strict`, `Lax` or `None`.
    pub session_same_site: Option<String>,
}

impl StorefrontSettings {
    /// Socket address to bind.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host.unwrap_or(DEFAULT_HOST), self.port)
    }

    /// Configured default locale, falling back to English.
    #[must_use]
    pub fn default_locale(&self) -> &str {
        self.default_locale.as_deref().unwrap_or(DEFAULT_LOCALE)
    }

    /// Rate-limit window.
    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// Pool checkout wait.
    #[must_use]
    pub fn db_checkout_timeout(&self) -> Duration {
        Duration::from_secs(self.db_checkout_timeout_secs)
    }

    /// Parsed proxy allow-list; empty when unset.
    ///
    /// # Errors
    /// The first entry that is not an IP address.
    pub fn trusted_proxies(&self) -> Result<Vec<IpAddr>, AddrParseError> {
        self.trusted_proxies
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::parse::<IpAddr>)
            .collect()
    }

    /// Interval between retention purges.
    #[must_use]
    pub fn audit_retention_interval(&self) -> Duration {
        Duration::from_secs(self.audit_retention_interval_secs)
    }

    /// Session key path, falling back to the mounted secret location.
    #[must_use]
    pub fn session_key_file(&self) -> PathBuf {
        self.session_key_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_KEY_FILE))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 16] = [
        "STOREFRONT_HOST",
        "STOREFRONT_PORT",
        "STOREFRONT_DATABASE_URL",
        "STOREFRONT_DB_MAX_CONNECTIONS",
        "STOREFRONT_DB_MIN_IDLE",
        "STOREFRONT_DB_CHECKOUT_TIMEOUT_SECS",
        "STOREFRONT_TRUSTED_PROXIES",
        "STOREFRONT_DEFAULT_LOCALE",
        "STOREFRONT_RATE_LIMIT_MAX",
        "STOREFRONT_RATE_LIMIT_WINDOW_SECS",
        "STOREFRONT_AUDIT_RETENTION_DAYS",
        "STOREFRONT_AUDIT_RETENTION_INTERVAL_SECS",
        "STOREFRONT_SESSION_KEY_FILE",
        "STOREFRONT_SESSION_ALLOW_EPHEMERAL",
        "STOREFRONT_COOKIE_SECURE",
        "STOREFRONT_SESSION_SAME_SITE",
    ];

    fn load_from_empty_args() -> StorefrontSettings {
        StorefrontSettings::load_from_iter([OsString::from("storefront")])
            .expect("config should load")
    }

    fn env_with(overrides: &[(&str, &str)]) -> Vec<(&'static str, Option<String>)> {
        VARS.iter()
            .map(|name| {
                let value = overrides
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| (*value).to_owned());
                (*name, value)
            })
            .collect()
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(env_with(&[]));

        let settings = load_from_empty_args();
        assert_eq!(settings.bind_addr(), "0.0.0.0:8080".parse().expect("addr"));
        assert!(settings.database_url.is_none());
        assert_eq!(settings.default_locale(), "en");
        assert_eq!(settings.rate_limit_max, 100);
        assert_eq!(settings.rate_limit_window(), Duration::from_secs(60));
        assert_eq!(settings.audit_retention_days, 90);
        assert_eq!(settings.audit_retention_interval(), Duration::from_secs(3600));
        assert_eq!(
            settings.session_key_file(),
            PathBuf::from(DEFAULT_SESSION_KEY_FILE)
        );
        assert!(!settings.session_allow_ephemeral);
        assert!(settings.cookie_secure);
        assert!(settings.session_same_site.is_none());
        assert_eq!(settings.db_max_connections, 10);
        assert!(settings.db_min_idle.is_none());
        assert_eq!(settings.db_checkout_timeout(), Duration::from_secs(30));
        assert_eq!(settings.trusted_proxies(), Ok(Vec::new()));
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(env_with(&[
            ("STOREFRONT_HOST", "127.0.0.1"),
            ("STOREFRONT_PORT", "9090"),
            ("STOREFRONT_DATABASE_URL", "postgres://localhost/storefront"),
            ("STOREFRONT_DEFAULT_LOCALE", "zh-CN"),
            ("STOREFRONT_RATE_LIMIT_MAX", "5"),
            ("STOREFRONT_AUDIT_RETENTION_DAYS", "7"),
            ("STOREFRONT_COOKIE_SECURE", "false"),
        ]));

        let settings = load_from_empty_args();
        assert_eq!(settings.bind_addr(), "127.0.0.1:9090".parse().expect("addr"));
        assert_eq!(
            settings.database_url.as_deref(),
            Some("postgres://localhost/storefront")
        );
        assert_eq!(settings.default_locale(), "zh-CN");
        assert_eq!(settings.rate_limit_max, 5);
        assert_eq!(settings.audit_retention_days, 7);
        assert!(!settings.cookie_secure);
    }

    #[rstest]
    fn pool_and_proxy_settings_are_read() {
        let _guard = lock_env(env_with(&[
            ("STOREFRONT_DB_MAX_CONNECTIONS", "4"),
            ("STOREFRONT_DB_CHECKOUT_TIMEOUT_SECS", "2"),
            ("STOREFRONT_TRUSTED_PROXIES", "10.0.0.1, ::1"),
        ]));

        let settings = load_from_empty_args();
        assert_eq!(settings.db_max_connections, 4);
        assert_eq!(settings.db_checkout_timeout(), Duration::from_secs(2));
        assert_eq!(
            settings.trusted_proxies(),
            Ok(vec![
                "10.0.0.1".parse::<IpAddr>().expect("v4"),
                "::1".parse::<IpAddr>().expect("v6"),
            ])
        );
    }

    #[rstest]
    fn malformed_proxy_entries_are_rejected() {
        let _guard = lock_env(env_with(&[("STOREFRONT_TRUSTED_PROXIES", "10.0.0.1,gateway")]));
        assert!(load_from_empty_args().trusted_proxies().is_err());
    }
}
