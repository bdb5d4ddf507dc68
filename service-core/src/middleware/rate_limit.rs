use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

/// Rate limiter keyed by client IP address
pub type IpRateLimiter = Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>>;

/// Idle keys are pruned once per this many checks.
const PRUNE_EVERY: u32 = 256;

/// Allows `attempts` requests per `window_seconds` for each IP, replenished evenly
/// across the window.
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    let attempts = NonZeroU32::new(attempts.max(1)).unwrap_or(NonZeroU32::MIN);
    let period_ms = (window_seconds.max(1) * 1000) / u64::from(attempts.get());
    let quota = Quota::with_period(Duration::from_millis(period_ms.max(1)))
        .unwrap_or_else(|| Quota::per_second(attempts))
        .allow_burst(attempts);

    Arc::new(RateLimiter::dashmap(quota))
}

/// Per-IP limiter state for [`ip_rate_limit_middleware`].
///
/// The peer address of the connection is the key. `X-Forwarded-For` is only read when
/// `trust_forwarded_for` is set, i.e. when the service sits behind a proxy that appends
/// the address it saw; the last hop of the header is used then.
#[derive(Clone)]
pub struct IpRateLimit {
    limiter: IpRateLimiter,
    trust_forwarded_for: bool,
    checks: Arc<AtomicU32>,
}

impl IpRateLimit {
    pub fn new(attempts: u32, window_seconds: u64, trust_forwarded_for: bool) -> Self {
        Self {
            limiter: create_ip_rate_limiter(attempts, window_seconds),
            trust_forwarded_for,
            checks: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of client addresses currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Forgets addresses whose quota has fully replenished.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    fn client_ip(&self, request: &Request) -> Option<IpAddr> {
        if self.trust_forwarded_for {
            let forwarded = request
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.rsplit(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok());
            if forwarded.is_some() {
                return forwarded;
            }
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    }

    fn check(&self, ip: IpAddr) -> Result<(), AppError> {
        if self.checks.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune();
        }

        self.limiter.check_key(&ip).map_err(|negative| {
            let wait_time = negative.wait_time_from(DefaultClock::default().now());
            tracing::warn!(%ip, "Rate limit exceeded");
            AppError::TooManyRequests(
                "Too many attempts. Please try again later.".to_string(),
                Some(wait_time.as_secs().max(1)),
            )
        })
    }
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(limit): State<IpRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match limit.client_ip(&request) {
        Some(ip) => {
            limit.check(ip)?;
            Ok(next.run(request).await)
        }
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request as HttpRequest, StatusCode},
        routing::post,
        Router,
    };
    use tower::ServiceExt;

    fn app(limit: IpRateLimit) -> Router {
        Router::new()
            .route("/login", post(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                limit,
                ip_rate_limit_middleware,
            ))
    }

    fn request(peer: &str, forwarded_for: &str) -> HttpRequest<Body> {
        let peer: SocketAddr = format!("{peer}:40000").parse().unwrap();
        HttpRequest::builder()
            .method("POST")
            .uri("/login")
            .header("x-forwarded-for", forwarded_for)
            .extension(ConnectInfo(peer))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn blocks_after_quota_is_spent() {
        let app = app(IpRateLimit::new(2, 60, false));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request("10.0.0.1", "198.51.100.1"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(request("10.0.0.1", "198.51.100.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn quotas_are_per_peer() {
        let app = app(IpRateLimit::new(1, 60, false));

        let first = app.clone().oneshot(request("10.0.0.1", "")).await.unwrap();
        let other = app.clone().oneshot(request("10.0.0.2", "")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rotating_forwarded_header_does_not_reset_quota_without_proxy() {
        let app = app(IpRateLimit::new(1, 60, false));

        let first = app
            .clone()
            .oneshot(request("10.0.0.1", "198.51.100.1"))
            .await
            .unwrap();
        let second = app
            .clone()
            .oneshot(request("10.0.0.1", "198.51.100.2"))
            .await
            .unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn trusted_proxy_keys_on_the_hop_it_appended() {
        let app = app(IpRateLimit::new(1, 60, true));

        let first = app
            .clone()
            .oneshot(request("10.0.0.254", "1.1.1.1, 203.0.113.9"))
            .await
            .unwrap();
        let spoofed = app
            .clone()
            .oneshot(request("10.0.0.254", "2.2.2.2, 203.0.113.9"))
            .await
            .unwrap();
        let other_client = app
            .clone()
            .oneshot(request("10.0.0.254", "203.0.113.10"))
            .await
            .unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(spoofed.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(other_client.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn prune_forgets_replenished_clients() {
        let limit = IpRateLimit::new(1, 1, false);
        let app = app(limit.clone());

        for peer in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            app.clone().oneshot(request(peer, "")).await.unwrap();
        }
        assert_eq!(limit.tracked_clients(), 3);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        limit.prune();

        assert_eq!(limit.tracked_clients(), 0);
    }
}
