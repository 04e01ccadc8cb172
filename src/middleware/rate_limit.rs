//! Rate limiting middleware.
//!
//! In-memory admission control per client key using a sliding window. Each
//! limiter is an owned value; routes that need different budgets get
//! different instances.

use crate::auth::error::AuthError;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Configuration for rate limiting.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    /// Maximum admitted requests per key inside any window.
    pub max_requests: usize,
    /// Window duration.
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: usize },
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Sliding-window limiter state, keyed by client.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl SlidingWindowLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    /// Check and, if allowed, record a request for `key` at `now`.
    ///
    /// Prune, count and append happen under one lock so concurrent requests
    /// for the same key cannot over-admit. Denied attempts are not recorded.
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        let mut state = self.state.lock();
        let timestamps = state.entry(key.to_string()).or_default();

        prune(timestamps, now, self.config.window);

        if timestamps.len() >= self.config.max_requests {
            let retry_after = timestamps
                .front()
                .and_then(|oldest| oldest.checked_add(self.config.window))
                .map(|free_at| free_at.saturating_duration_since(now))
                .unwrap_or(self.config.window);
            return Admission::Denied { retry_after };
        }

        timestamps.push_back(now);
        Admission::Allowed {
            remaining: self.config.max_requests - timestamps.len(),
        }
    }

    /// Drop keys with no requests left inside the window. Returns how many
    /// keys were evicted.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let before = state.len();
        let window = self.config.window;

        state.retain(|_, timestamps| {
            prune(timestamps, now, window);
            !timestamps.is_empty()
        });

        before - state.len()
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.state.lock().len()
    }

    /// Periodic cleanup of idle keys on a background task.
    pub fn spawn_sweeper(&self, period: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let evicted = limiter.sweep();
                if evicted > 0 {
                    debug!(
                        evicted,
                        tracked = limiter.tracked_keys(),
                        "Rate limiter sweep"
                    );
                }
            }
        })
    }
}

/// Remove timestamps at or before `now - window`.
fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    let Some(window_start) = now.checked_sub(window) else {
        return;
    };
    while timestamps.front().is_some_and(|ts| *ts <= window_start) {
        timestamps.pop_front();
    }
}

/// Client key: peer address, else first `X-Forwarded-For` hop, else "unknown".
pub fn client_key(request: &Request<Body>) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware function.
pub async fn rate_limit_middleware(
    State(limiter): State<SlidingWindowLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(&request);

    match limiter.admit(&key) {
        Admission::Allowed { .. } => next.run(request).await,
        Admission::Denied { retry_after } => {
            warn!(
                client = %key,
                path = %request.uri().path(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );

            AuthError::RateLimited { retry_after }.into_response()
        }
    }
}
