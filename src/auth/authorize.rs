//! Role-based authorization gate.

use crate::auth::{
    authenticator::current_user,
    error::AuthError,
    models::{CurrentUser, UserRole},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

/// Allows a request through only if the attached identity holds one of the
/// configured roles. Must run after `auth_middleware`.
#[derive(Clone, Debug)]
pub struct RoleGate {
    allowed: Arc<[UserRole]>,
}

impl RoleGate {
    pub fn new(allowed: impl IntoIterator<Item = UserRole>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn admin_only() -> Self {
        Self::new([UserRole::Admin])
    }

    pub fn check(&self, user: Option<&CurrentUser>) -> Result<(), AuthError> {
        let user = user.ok_or(AuthError::NO_CREDENTIAL)?;

        if self.allowed.contains(&user.role()) {
            Ok(())
        } else {
            warn!(
                user_id = %user.0.id,
                role = %user.role(),
                "Role not permitted for route"
            );
            Err(AuthError::Forbidden)
        }
    }
}

pub async fn require_roles(
    State(gate): State<RoleGate>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    gate.check(current_user(&req))?;
    Ok(next.run(req).await)
}
