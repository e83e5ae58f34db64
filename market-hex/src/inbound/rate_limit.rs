//! Rate limiting middleware using Governor.
//!
//! Implements per-API-key rate limiting with a token bucket algorithm.

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
};
use serde_json::json;
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Requests per minute when nothing is configured.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 100;

/// Rate limiter state shared across requests.
pub struct RateLimiterState {
    /// One bucket per API key (`anonymous` for keyless callers)
    limiters: DashMap<String, Arc<DirectLimiter>>,
    quota: Quota,
    clock: DefaultClock,
}

impl Default for RateLimiterState {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_MINUTE, Duration::from_secs(60))
    }
}

impl RateLimiterState {
    /// Allows `requests` per `period`, refilled evenly, with a burst of
    /// `requests`. A zero request count is treated as one.
    pub fn new(requests: u32, period: Duration) -> Self {
        let burst = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            limiters: DashMap::new(),
            quota,
            clock: DefaultClock::default(),
        }
    }

    /// Takes one token from `key`'s bucket.
    ///
    /// On refusal returns how long until the next token.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let limiter = self
            .limiters
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone();

        limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }
}

fn bypasses_limit(path: &str) -> bool {
    path == "/health" || path.starts_with("/swagger-ui") || path.starts_with("/api-docs")
}

/// Rate limiting middleware keyed by the presented API key.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if bypasses_limit(request.uri().path()) {
        return next.run(request).await;
    }

    let key = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").to_string())
        .unwrap_or_else(|| "anonymous".to_string());

    if let Err(wait) = limiter.check(&key) {
        tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limited");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Rate limit exceeded. Please try again later.",
                "retry_after_seconds": wait.as_secs().max(1)
            })),
        )
            .into_response();
    }

    next.run(request).await
}
