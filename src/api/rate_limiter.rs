//! Per-client-IP rate limiting middleware for the REST API

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{DefaultKeyedRateLimiter, Quota};
use serde_json::json;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Keyed GCRA limiter: each client IP gets its own per-minute budget.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<DefaultKeyedRateLimiter<IpAddr>>,
}

impl RateLimiter {
    /// A zero budget is clamped to one request per minute.
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Self {
            inner: Arc::new(governor::RateLimiter::keyed(Quota::per_minute(per_minute))),
        }
    }

    pub fn check_rate_limit(&self, ip: IpAddr) -> bool {
        self.inner.check_key(&ip).is_ok()
    }

    /// Drops state for clients whose budget has fully refilled.
    pub fn cleanup_expired(&self) {
        self.inner.retain_recent();
    }

    pub fn tracked_clients(&self) -> usize {
        self.inner.len()
    }

    /// Runs `cleanup_expired` every `period` until the handle is aborted.
    pub fn spawn_cleanup(&self, period: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                limiter.cleanup_expired();
                tracing::trace!(clients = limiter.tracked_clients(), "Rate limiter state pruned");
            }
        })
    }
}

/// First hop of `x-forwarded-for`, else loopback.
pub fn client_ip(request: &Request) -> IpAddr {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);

    if limiter.check_rate_limit(ip) {
        next.run(request).await
    } else {
        tracing::debug!(%ip, "Rate limit exceeded");
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Rate limit exceeded. Please try again later." })),
        )
            .into_response()
    }
}
