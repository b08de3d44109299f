//! # Upload Rate Limiting
//!
//! Per-client sliding window limiter for `POST /upload`. Clients are keyed
//! by peer IP address; requests without connection info share one bucket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tower::{Layer, Service};

use super::share_routes::ErrorResponse;

/// Bucket for requests with no peer address
pub const ANONYMOUS_CLIENT: &str = "_anonymous";

/// Tracked clients before idle windows are pruned
const PRUNE_THRESHOLD: usize = 4096;

/// Rate limit settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Uploads allowed per client per window
    #[serde(default = "default_upload_requests")]
    pub upload_requests: u64,

    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_upload_requests() -> u64 {
    5
}

fn default_window_seconds() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            upload_requests: default_upload_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

/// An allowed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub limit: u64,
    /// Approximate requests left in the current window
    pub remaining: u64,
    /// Seconds until the current window closes
    pub reset_after: u64,
}

/// A refused request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub limit: u64,
    pub retry_after: u64,
}

#[derive(Debug, Clone, Copy)]
struct WindowCounts {
    window_start: u64,
    current: u64,
    previous: u64,
}

/// In-process sliding window limiter.
///
/// The effective count is `previous * weight + current`, where `weight` is
/// the share of the previous window still inside the sliding window.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u64,
    window_seconds: u64,
    clients: Mutex<HashMap<String, WindowCounts>>,
}

impl RateLimiter {
    pub fn new(limit: u64, window_seconds: u64) -> Self {
        Self {
            limit,
            window_seconds: window_seconds.max(1),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter for `config`, or `None` when limiting is off
    pub fn from_config(config: &RateLimitConfig) -> Option<Arc<Self>> {
        config
            .enabled
            .then(|| Arc::new(Self::new(config.upload_requests, config.window_seconds)))
    }

    /// Check and record one request from `client`
    pub fn check(&self, client: &str) -> Result<RateLimitResult, RateLimitExceeded> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.check_at(client, now)
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn check_at(&self, client: &str, now: u64) -> Result<RateLimitResult, RateLimitExceeded> {
        let window = self.window_seconds;
        let window_start = (now / window) * window;
        let elapsed = now - window_start;
        let reset_after = window.saturating_sub(elapsed);

        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if clients.len() >= PRUNE_THRESHOLD {
            let oldest_relevant = window_start.saturating_sub(window);
            clients.retain(|_, counts| counts.window_start >= oldest_relevant);
        }

        let counts = clients.entry(client.to_string()).or_insert(WindowCounts {
            window_start,
            current: 0,
            previous: 0,
        });
        if counts.window_start != window_start {
            let previous = if counts.window_start + window == window_start {
                counts.current
            } else {
                0
            };
            *counts = WindowCounts {
                window_start,
                current: 0,
                previous,
            };
        }

        let weight = reset_after as f64 / window as f64;
        let effective = (counts.previous as f64 * weight) as u64 + counts.current;
        if effective >= self.limit {
            return Err(RateLimitExceeded {
                limit: self.limit,
                retry_after: reset_after.max(1),
            });
        }

        counts.current += 1;
        Ok(RateLimitResult {
            limit: self.limit,
            remaining: self.limit.saturating_sub(effective + 1),
            reset_after,
        })
    }
}

/// Tower layer applying a [`RateLimiter`] to the routes it wraps
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    limiter: Option<Arc<RateLimiter>>,
}

impl RateLimitLayer {
    pub fn new(limiter: Option<Arc<RateLimiter>>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: Option<Arc<RateLimiter>>,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(limiter) = limiter else {
                return inner.call(req).await;
            };

            let client = client_id(&req);
            match limiter.check(&client) {
                Ok(result) => {
                    let response = inner.call(req).await?;
                    Ok(with_rate_limit_headers(response, &result))
                }
                Err(exceeded) => {
                    tracing::warn!(
                        client = %client,
                        limit = exceeded.limit,
                        retry_after = exceeded.retry_after,
                        "upload rate limit exceeded"
                    );
                    Ok(rate_limited_response(&exceeded))
                }
            }
        })
    }
}

fn client_id(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| ANONYMOUS_CLIENT.to_string(), |info| info.0.ip().to_string())
}

fn with_rate_limit_headers(response: Response, result: &RateLimitResult) -> Response {
    let (mut parts, body) = response.into_parts();
    parts.headers.insert("x-ratelimit-limit", result.limit.into());
    parts.headers.insert("x-ratelimit-remaining", result.remaining.into());
    parts.headers.insert("x-ratelimit-reset", result.reset_after.into());
    Response::from_parts(parts, body)
}

fn rate_limited_response(exceeded: &RateLimitExceeded) -> Response {
    let status = StatusCode::TOO_MANY_REQUESTS;
    let mut response = (
        status,
        Json(ErrorResponse {
            error: format!("rate limit exceeded, retry in {}s", exceeded.retry_after),
            code: status.as_u16(),
        }),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, exceeded.retry_after.into());
    headers.insert("x-ratelimit-limit", exceeded.limit.into());
    headers.insert("x-ratelimit-remaining", 0u64.into());
    response
}
