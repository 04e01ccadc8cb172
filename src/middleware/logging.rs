//! Request logging middleware.
//!
//! Logs every HTTP request with method, path, status code, latency and the
//! rate-limit client key.

use crate::middleware::rate_limit::client_key;
use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn, Instrument};

/// Middleware that logs HTTP requests with timing information.
///
/// INFO for 2xx/3xx/4xx, WARN for 5xx. `/health` is skipped.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Skip logging for health checks to reduce noise
    if path == "/health" {
        return next.run(request).await;
    }

    let client = client_key(&request);
    let span = tracing::info_span!(
        "http_request",
        method = %method,
        path = %path,
        client = %client,
    );

    let start = Instant::now();
    let response = next.run(request).instrument(span).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if status >= 500 {
        warn!(
            method = %method,
            path = %path,
            status,
            latency_ms,
            client = %client,
            "Request failed (5xx)"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status,
            latency_ms,
            "Request completed"
        );
    }

    response
}
