//! Per-client request throttling.
//!
//! [`FixedWindowLimiter`] admits at most `limit` requests per client within a
//! fixed window. [`Throttle`] applies it keyed by the peer IP address and
//! rejects excess requests with [`Error::RateLimited`], which the exception
//! filter renders as `429` with `Retry-After`.
//!
//! Forwarding headers are client controlled, so they only name the client
//! when the peer is a configured trusted proxy.

use std::net::IpAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::{LocalBoxFuture, Ready, ready};
use mockable::Clock;
use tracing::debug;

use crate::domain::Error;

const UNKNOWN_CLIENT: &str = "unknown";
const PURGE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: DateTime<Utc>,
    count: u32,
}

/// Fixed-window request counter keyed by client.
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: DashMap<String, Window>,
}

impl FixedWindowLimiter {
    /// Admit `limit` requests per `window` for each key.
    pub fn new(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window,
            clock,
            windows: DashMap::new(),
        }
    }

    fn elapsed(&self, window: &Window, now: DateTime<Utc>) -> Duration {
        (now - window.started).to_std().unwrap_or_default()
    }

    /// Count one request for `key`.
    ///
    /// # Errors
    /// The time until the window resets when `key` has exhausted its quota.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let now = self.clock.utc();
        if self.windows.len() > PURGE_THRESHOLD {
            self.purge_expired();
        }
        let mut entry = self.windows.entry(key.to_owned()).or_insert(Window {
            started: now,
            count: 0,
        });
        let mut elapsed = self.elapsed(&entry, now);
        if elapsed >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
            elapsed = Duration::ZERO;
        }
        if entry.count >= self.limit {
            return Err(self.window.saturating_sub(elapsed));
        }
        entry.count += 1;
        Ok(())
    }

    /// Drop counters whose window has ended.
    pub fn purge_expired(&self) {
        let now = self.clock.utc();
        self.windows
            .retain(|_, window| self.elapsed(window, now) < self.window);
    }

    /// Number of tracked clients.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

impl std::fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("tracked", &self.windows.len())
            .finish_non_exhaustive()
    }
}

/// Throttling middleware keyed by client IP.
#[derive(Clone, Debug)]
pub struct Throttle {
    limiter: Arc<FixedWindowLimiter>,
    trusted_proxies: Arc<[IpAddr]>,
}

impl Throttle {
    /// Middleware enforcing `limiter` per peer address.
    #[must_use]
    pub fn new(limiter: Arc<FixedWindowLimiter>) -> Self {
        Self {
            limiter,
            trusted_proxies: Arc::from(Vec::new()),
        }
    }

    /// Key requests arriving from `proxies` by their forwarded client address.
    #[must_use]
    pub fn with_trusted_proxies(mut self, proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        self.trusted_proxies = proxies.into_iter().collect();
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for Throttle
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = ThrottleMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ThrottleMiddleware {
            service,
            limiter: Arc::clone(&self.limiter),
            trusted_proxies: Arc::clone(&self.trusted_proxies),
        }))
    }
}

/// Service wrapper produced by [`Throttle`].
pub struct ThrottleMiddleware<S> {
    service: S,
    limiter: Arc<FixedWindowLimiter>,
    trusted_proxies: Arc<[IpAddr]>,
}

fn client_key(req: &ServiceRequest, trusted_proxies: &[IpAddr]) -> String {
    let Some(peer) = req.peer_addr().map(|addr| addr.ip()) else {
        return UNKNOWN_CLIENT.to_owned();
    };
    if trusted_proxies.contains(&peer) {
        if let Some(forwarded) = req.connection_info().realip_remote_addr() {
            return forwarded.to_owned();
        }
    }
    peer.to_string()
}

impl<S, B> Service<ServiceRequest> for ThrottleMiddleware<S>
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
        let client = client_key(&req, &self.trusted_proxies);
        if let Err(retry_after) = self.limiter.check(&client) {
            debug!(%client, ?retry_after, "request throttled");
            let res = req.error_response(Error::too_many_requests(Some(retry_after)));
            return Box::pin(ready(Ok(res.map_into_right_body())));
        }
        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}

#[cfg(test)]
mod tests {
    //! Window accounting and rejection rendering.
    use std::sync::Mutex;

    use std::net::SocketAddr;

    use actix_web::http::StatusCode;
    use actix_web::test::{TestRequest, call_service, init_service, read_body_json};
    use actix_web::{App, HttpResponse, web};
    use chrono::TimeZone;
    use mockable::MockClock;
    use rstest::rstest;
    use serde_json::Value;

    use super::*;
    use crate::domain::Localizer;
    use crate::middleware::ExceptionFilter;

    /// Clock whose instant can be advanced by the test.
    fn movable_clock() -> (Arc<dyn Clock>, Arc<Mutex<DateTime<Utc>>>) {
        let now = Arc::new(Mutex::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0)
                .single()
                .expect("valid instant"),
        ));
        let shared = Arc::clone(&now);
        let mut clock = MockClock::new();
        clock
            .expect_utc()
            .returning(move || *shared.lock().expect("clock lock"));
        (Arc::new(clock), now)
    }

    fn advance(now: &Mutex<DateTime<Utc>>, secs: i64) {
        let mut guard = now.lock().expect("clock lock");
        *guard += chrono::TimeDelta::seconds(secs);
    }

    #[rstest]
    fn admits_up_to_the_limit_per_key() {
        let (clock, _) = movable_clock();
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(60), clock);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());
        assert_eq!(limiter.check("a"), Err(Duration::from_secs(60)));
    }

    #[rstest]
    fn window_resets_after_it_elapses() {
        let (clock, now) = movable_clock();
        let limiter = FixedWindowLimiter::new(1, Duration::from_secs(60), clock);
        assert!(limiter.check("a").is_ok());
        advance(&now, 45);
        assert_eq!(limiter.check("a"), Err(Duration::from_secs(15)));
        advance(&now, 15);
        assert!(limiter.check("a").is_ok());
    }

    #[rstest]
    fn purge_drops_finished_windows() {
        let (clock, now) = movable_clock();
        let limiter = FixedWindowLimiter::new(5, Duration::from_secs(10), clock);
        assert!(limiter.check("a").is_ok());
        advance(&now, 5);
        assert!(limiter.check("b").is_ok());
        advance(&now, 6);
        limiter.purge_expired();
        assert_eq!(limiter.tracked(), 1);
    }

    const PEER: &str = "192.0.2.10:40123";
    const PROXY: &str = "192.0.2.1:443";

    fn from(peer: &str, forwarded_for: Option<&str>) -> actix_http::Request {
        let peer: SocketAddr = peer.parse().expect("socket address");
        let mut req = TestRequest::get().uri("/").peer_addr(peer);
        if let Some(client) = forwarded_for {
            req = req.insert_header(("x-forwarded-for", client.to_owned()));
        }
        req.to_request()
    }

    #[actix_web::test]
    async fn excess_requests_become_429_envelopes() {
        let (clock, _) = movable_clock();
        let limiter = Arc::new(FixedWindowLimiter::new(1, Duration::from_secs(30), clock));
        let app = init_service(
            App::new()
                .wrap(Throttle::new(limiter))
                .wrap(ExceptionFilter::new(Localizer::disabled()))
                .route("/", web::get().to(HttpResponse::Ok)),
        )
        .await;

        assert_eq!(call_service(&app, from(PEER, None)).await.status(), StatusCode::OK);

        let res = call_service(&app, from(PEER, None)).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            res.headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok()),
            Some("30")
        );
        let body: Value = read_body_json(res).await;
        assert_eq!(body["code"], 429);
        assert_eq!(body["message"], "Too many requests, please try again later");
    }

    #[actix_web::test]
    async fn rotating_forwarded_headers_share_the_peer_quota() {
        let (clock, _) = movable_clock();
        let limiter = Arc::new(FixedWindowLimiter::new(1, Duration::from_secs(30), clock));
        let app = init_service(
            App::new()
                .wrap(Throttle::new(Arc::clone(&limiter)))
                .route("/", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let mut statuses = Vec::new();
        for octet in 0..5 {
            let spoofed = format!("10.0.0.{octet}");
            statuses.push(call_service(&app, from(PEER, Some(&spoofed))).await.status());
        }

        assert_eq!(statuses[0], StatusCode::OK);
        assert!(statuses[1..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(limiter.tracked(), 1);
    }

    #[actix_web::test]
    async fn trusted_proxies_key_by_forwarded_client() {
        let (clock, _) = movable_clock();
        let limiter = Arc::new(FixedWindowLimiter::new(1, Duration::from_secs(30), clock));
        let proxy: SocketAddr = PROXY.parse().expect("proxy address");
        let app = init_service(
            App::new()
                .wrap(Throttle::new(limiter).with_trusted_proxies([proxy.ip()]))
                .route("/", web::get().to(HttpResponse::Ok)),
        )
        .await;

        let ok = StatusCode::OK;
        assert_eq!(call_service(&app, from(PROXY, Some("198.51.100.4"))).await.status(), ok);
        assert_eq!(call_service(&app, from(PROXY, Some("198.51.100.5"))).await.status(), ok);
        assert_eq!(
            call_service(&app, from(PROXY, Some("198.51.100.4"))).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
