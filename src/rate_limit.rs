//! Per-IP rate limiting middleware using a fixed-window counter.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use dashmap::DashMap;

use crate::error::ApiError;
use crate::state::AppState;

struct ClientWindow {
    count: u64,
    started: Instant,
}

/// In-memory per-IP rate limiter with fixed-window counters.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    max_requests: u64,
    window: Duration,
    clients: DashMap<IpAddr, ClientWindow>,
}

impl RateLimiter {
    /// Creates a new rate limiter. `max_requests = 0` means disabled.
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                max_requests,
                window,
                clients: DashMap::new(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.max_requests > 0
    }

    /// Returns `true` if the request is allowed, `false` if rate-limited.
    pub fn check(&self, ip: IpAddr) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let mut entry = self.inner.clients.entry(ip).or_insert(ClientWindow {
            count: 0,
            started: Instant::now(),
        });
        let window = entry.value_mut();

        if window.started.elapsed() > self.inner.window {
            // Window expired — reset
            window.count = 1;
            window.started = Instant::now();
            true
        } else if window.count < self.inner.max_requests {
            window.count += 1;
            true
        } else {
            false
        }
    }

    /// Removes entries for expired windows (background cleanup).
    pub fn cleanup(&self) {
        let window = self.inner.window;
        self.inner
            .clients
            .retain(|_, client| client.started.elapsed() <= window);
    }
}

/// Extracts the client IP from the request.
fn extract_ip(req: &Request) -> Option<IpAddr> {
    // X-Forwarded-For takes priority (reverse proxy)
    if let Some(xff) = req.headers().get("x-forwarded-for")
        && let Ok(s) = xff.to_str()
        && let Some(first) = s.split(',').next()
        && let Ok(ip) = first.trim().parse::<IpAddr>()
    {
        return Some(ip);
    }

    // Fallback to ConnectInfo (direct connection)
    req.extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip())
}

/// Rate-limiting middleware. Returns 429 when the per-IP limit is exceeded.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limiter = state.rate_limiter();
    if !limiter.is_enabled() {
        return Ok(next.run(req).await);
    }

    if let Some(ip) = extract_ip(&req)
        && !limiter.check(ip)
    {
        return Err(ApiError::TooManyRequests);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..1000 {
            assert!(limiter.check(ip));
        }
    }

    #[test]
    fn limit_applies_per_ip() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(a));
        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        // A different client is unaffected.
        assert!(limiter.check(b));
    }
}
