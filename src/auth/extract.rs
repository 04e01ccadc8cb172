//! Bearer credential extraction.

use axum::http::{header::AUTHORIZATION, HeaderMap};

const BEARER_PREFIX: &str = "Bearer ";

/// Pull the credential out of `Authorization: Bearer <token>`.
///
/// The scheme match is exact and case-sensitive. Anything else, including a
/// non-UTF-8 header or an empty token, yields `None`.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix(BEARER_PREFIX))
        .filter(|token| !token.is_empty())
}
