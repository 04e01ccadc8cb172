//! Auth error taxonomy and its HTTP mapping.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;

/// Terminal failures of the auth / admission chain.
///
/// The message carried by `Unauthenticated` is the only cause detail that
/// reaches the client; codec-level reasons stay in the logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Unauthenticated(&'static str),
    #[error("insufficient permissions")]
    Forbidden,
    #[error("too many requests")]
    RateLimited { retry_after: Duration },
    #[error("identity service unavailable")]
    ServiceUnavailable,
}

impl AuthError {
    pub const NO_CREDENTIAL: AuthError = AuthError::Unauthenticated("no credential");
    pub const INVALID_CREDENTIAL: AuthError = AuthError::Unauthenticated("invalid credential");
    pub const IDENTITY_NOT_FOUND: AuthError = AuthError::Unauthenticated("identity not found");
    pub const ACCOUNT_DEACTIVATED: AuthError = AuthError::Unauthenticated("account deactivated");

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));

        match self {
            AuthError::RateLimited { retry_after } => {
                // Round up so clients never retry inside the window.
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}
