//! Middleware for observability and admission control.
//!
//! This module provides:
//! - Request logging with latency tracking
//! - Sliding-window rate limiting per client key

pub mod logging;
pub mod rate_limit;

pub use logging::request_logging;
pub use rate_limit::{rate_limit_middleware, Admission, RateLimitConfig, SlidingWindowLimiter};
