/// Rate limiting for the approval-code and login endpoints
///
/// Approval codes are short, so code validation, signup and login are
/// throttled per client to slow down guessing. State is a token bucket per
/// client held in process memory.
///
/// # Algorithm
///
/// - Tokens refill at a constant rate (`per_minute / 60` per second)
/// - Each request consumes 1 token
/// - Request blocked if bucket empty
///
/// # Client Key
///
/// The peer address, else a shared `unknown` bucket. With `TRUST_PROXY` set,
/// the first address in `X-Forwarded-For` wins; the header is client-controlled
/// otherwise, so it is ignored.
///
/// At most `MAX_TRACKED_CLIENTS` buckets are held. When a new client arrives
/// at the cap, full (idle) buckets are dropped, then the least recently
/// refilled ones until a tenth of the cap is free.
///
/// # Headers
///
/// - `X-RateLimit-Limit`: Requests allowed per minute
/// - `X-RateLimit-Remaining`: Tokens remaining
/// - `Retry-After`: Seconds to wait (429 responses only)

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Hard cap on buckets held in memory
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// Rate limit configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Maximum requests per minute
    pub requests_per_minute: u32,

    /// Token refill rate (tokens per second)
    pub refill_rate: f64,

    /// Maximum tokens in bucket (burst capacity)
    pub bucket_capacity: u32,
}

impl RateLimit {
    pub fn per_minute(requests_per_minute: u32) -> Self {
        RateLimit {
            requests_per_minute,
            refill_rate: requests_per_minute as f64 / 60.0,
            bucket_capacity: requests_per_minute,
        }
    }
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32) -> Self {
        TokenBucket {
            tokens: capacity as f64,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, rate: f64, capacity: u32) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * rate).min(capacity as f64);
        self.last_refill = now;
    }

    fn try_consume(&mut self, count: f64) -> bool {
        if self.tokens >= count {
            self.tokens -= count;
            true
        } else {
            false
        }
    }

    fn seconds_until_available(&self, count: f64, rate: f64) -> u64 {
        let deficit = count - self.tokens;
        if deficit <= 0.0 {
            0
        } else {
            (deficit / rate).ceil() as u64
        }
    }

    /// Whether the bucket would be full after refilling at `now`
    fn is_full_at(&self, now: Instant, rate: f64, capacity: u32) -> bool {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens + elapsed * rate >= capacity as f64
    }
}

/// Result of rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub ok: bool,
    pub remaining: u32,

    /// Seconds until one request is allowed again (0 when `ok`)
    pub retry_after: u64,
}

/// In-process token buckets keyed by client
#[derive(Clone)]
pub struct RateLimiter {
    limit: RateLimit,
    max_clients: usize,
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self::with_max_clients(limit, MAX_TRACKED_CLIENTS)
    }

    pub fn with_max_clients(limit: RateLimit, max_clients: usize) -> Self {
        Self {
            limit,
            max_clients: max_clients.max(1),
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Consumes one token for `client`
    pub async fn check(&self, client: &str) -> RateLimitResult {
        let RateLimit {
            refill_rate,
            bucket_capacity,
            ..
        } = self.limit;

        let mut buckets = self.buckets.lock().await;

        if buckets.len() >= self.max_clients && !buckets.contains_key(client) {
            self.evict(&mut buckets);
        }

        let bucket = buckets
            .entry(client.to_string())
            .or_insert_with(|| TokenBucket::new(bucket_capacity));
        bucket.refill(refill_rate, bucket_capacity);

        if bucket.try_consume(1.0) {
            RateLimitResult {
                ok: true,
                remaining: bucket.tokens.floor() as u32,
                retry_after: 0,
            }
        } else {
            RateLimitResult {
                ok: false,
                remaining: 0,
                retry_after: bucket.seconds_until_available(1.0, refill_rate).max(1),
            }
        }
    }

    /// Number of clients currently holding a bucket
    pub async fn tracked_clients(&self) -> usize {
        self.buckets.lock().await.len()
    }

    fn evict(&self, buckets: &mut HashMap<String, TokenBucket>) {
        let RateLimit {
            refill_rate,
            bucket_capacity,
            ..
        } = self.limit;
        let now = Instant::now();
        buckets.retain(|_, bucket| !bucket.is_full_at(now, refill_rate, bucket_capacity));

        let target = self.max_clients - (self.max_clients / 10).max(1);
        if buckets.len() <= target {
            return;
        }

        let mut by_age: Vec<(Instant, String)> = buckets
            .iter()
            .map(|(client, bucket)| (bucket.last_refill, client.clone()))
            .collect();
        by_age.sort_unstable_by_key(|(last_refill, _)| *last_refill);

        let excess = buckets.len() - target;
        for (_, client) in by_age.into_iter().take(excess) {
            buckets.remove(&client);
        }
        tracing::debug!(evicted = excess, "Rate limiter at capacity, evicted idle clients");
    }
}

/// Identifies the caller for rate limiting
///
/// `X-Forwarded-For` is only read when `trust_proxy` is set.
pub fn client_key(request: &Request, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(forwarded) = request
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware layer
///
/// # Errors
///
/// - 429 Too Many Requests: Rate limit exceeded
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = client_key(&request, state.config.rate_limit.trust_proxy);
    let result = state.rate_limiter.check(&client).await;
    let limit = state.rate_limiter.limit();

    if !result.ok {
        tracing::warn!(
            client = %client,
            path = %request.uri().path(),
            retry_after = result.retry_after,
            "Rate limit exceeded"
        );
        return Err(ApiError::RateLimitExceeded {
            retry_after: result.retry_after,
            message: format!(
                "Too many attempts. Try again in {} seconds",
                result.retry_after
            ),
        });
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        HeaderValue::from(limit.requests_per_minute),
    );
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(result.remaining));

    Ok(response)
}
