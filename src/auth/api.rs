//! Authentication API Endpoints
//! Mission: Provide registration, login and user management endpoints

use crate::auth::{
    jwt::JwtHandler,
    models::{
        CurrentUser, LoginRequest, LoginResponse, RegisterRequest, SetActiveRequest,
        SetRoleRequest, User, UserResponse, UserRole,
    },
    user_store::{is_constraint_violation, IdentityStore, UserStore},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub jwt_handler: Arc<JwtHandler>,
}

impl AuthState {
    pub fn new(user_store: Arc<UserStore>, jwt_handler: Arc<JwtHandler>) -> Self {
        Self {
            user_store,
            jwt_handler,
        }
    }

    fn login_response(&self, user: &User) -> Result<LoginResponse, AuthApiError> {
        let issued = self.jwt_handler.issue(user).map_err(|e| {
            error!(error = %e, "Failed to issue token");
            AuthApiError::InternalError
        })?;

        Ok(LoginResponse {
            token: issued.token,
            expires_in: issued.expires_in,
            user: UserResponse::from_user(user),
        })
    }
}

/// Registration endpoint - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), AuthApiError> {
    if payload.display_name.trim().is_empty() {
        return Err(AuthApiError::InvalidInput("display_name is required"));
    }
    if !payload.email.contains('@') {
        return Err(AuthApiError::InvalidInput("email is invalid"));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AuthApiError::WeakPassword);
    }

    let store = state.user_store.clone();
    let user = tokio::task::spawn_blocking(move || {
        store.create_user(
            &payload.display_name,
            &payload.email,
            &payload.password,
            UserRole::User,
        )
    })
    .await
    .map_err(|e| {
        error!(error = %e, "User creation task failed");
        AuthApiError::InternalError
    })?
    .map_err(|e| {
        if is_constraint_violation(&e) {
            AuthApiError::EmailTaken
        } else {
            error!(error = %e, "Failed to create user");
            AuthApiError::InternalError
        }
    })?;

    Ok((StatusCode::CREATED, Json(state.login_response(&user)?)))
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthApiError> {
    let user = state
        .user_store
        .find_by_credentials(&payload.email, &payload.password)
        .await
        .map_err(|e| {
            error!(error = %e, "Credential check failed");
            AuthApiError::InternalError
        })?
        .ok_or_else(|| {
            warn!("❌ Failed login attempt");
            AuthApiError::InvalidCredentials
        })?;

    if !user.is_active {
        warn!(user_id = %user.id, "Login refused for deactivated account");
        return Err(AuthApiError::AccountDeactivated);
    }

    info!(user_id = %user.id, role = %user.role, "✅ Login successful");

    Ok(Json(state.login_response(&user)?))
}

/// Get current user info - GET /api/auth/me
pub async fn get_current_user(Extension(current): Extension<CurrentUser>) -> Json<UserResponse> {
    Json(UserResponse::from_user(&current.0))
}

/// List all users - GET /api/admin/users (Admin only)
pub async fn list_users(
    State(state): State<AuthState>,
) -> Result<Json<Vec<UserResponse>>, AuthApiError> {
    let users = with_store(&state, "list_users", |store| store.list_users()).await?;

    Ok(Json(users.iter().map(UserResponse::from_user).collect()))
}

/// Activate / deactivate - PATCH /api/admin/users/:id/active (Admin only)
pub async fn set_user_active(
    State(state): State<AuthState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<String>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<UserResponse>, AuthApiError> {
    let uuid = parse_target(&user_id, &current)?;

    let user = with_store(&state, "set_active", move |store| {
        if !store.set_active(&uuid, payload.is_active)? {
            return Ok(None);
        }
        store.get_user_by_id(&uuid)
    })
    .await?
    .ok_or(AuthApiError::UserNotFound)?;

    Ok(Json(UserResponse::from_user(&user)))
}

/// Change role - PATCH /api/admin/users/:id/role (Admin only)
pub async fn set_user_role(
    State(state): State<AuthState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<String>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<UserResponse>, AuthApiError> {
    let uuid = parse_target(&user_id, &current)?;

    let user = with_store(&state, "set_role", move |store| {
        if !store.set_role(&uuid, payload.role)? {
            return Ok(None);
        }
        store.get_user_by_id(&uuid)
    })
    .await?
    .ok_or(AuthApiError::UserNotFound)?;

    Ok(Json(UserResponse::from_user(&user)))
}

/// Delete user - DELETE /api/admin/users/:id (Admin only)
pub async fn delete_user(
    State(state): State<AuthState>,
    Extension(current): Extension<CurrentUser>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AuthApiError> {
    let uuid = parse_target(&user_id, &current)?;

    let found = with_store(&state, "delete_user", move |store| {
        if store.get_user_by_id(&uuid)?.is_none() {
            return Ok(false);
        }
        store.delete_user(&uuid)?;
        Ok(true)
    })
    .await?;

    if !found {
        return Err(AuthApiError::UserNotFound);
    }

    info!(user_id = %uuid, "🗑️  User deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

// Admins may not lock themselves out.
fn parse_target(user_id: &str, current: &CurrentUser) -> Result<Uuid, AuthApiError> {
    let uuid = Uuid::parse_str(user_id).map_err(|_| AuthApiError::InvalidUserId)?;
    if uuid == current.0.id {
        return Err(AuthApiError::CannotModifySelf);
    }
    Ok(uuid)
}

/// Run a synchronous store call on the blocking pool
async fn with_store<T, F>(state: &AuthState, op: &'static str, f: F) -> Result<T, AuthApiError>
where
    F: FnOnce(&UserStore) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = state.user_store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| {
            error!(error = %e, op, "User store task failed");
            AuthApiError::InternalError
        })?
        .map_err(|e| {
            error!(error = %e, op, "User store call failed");
            AuthApiError::InternalError
        })
}

/// Auth API errors
#[derive(Debug, PartialEq, Eq)]
pub enum AuthApiError {
    InvalidCredentials,
    AccountDeactivated,
    InvalidInput(&'static str),
    WeakPassword,
    EmailTaken,
    InvalidUserId,
    UserNotFound,
    CannotModifySelf,
    InternalError,
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthApiError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid email or password")
            }
            AuthApiError::AccountDeactivated => (StatusCode::UNAUTHORIZED, "account deactivated"),
            AuthApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AuthApiError::WeakPassword => (
                StatusCode::BAD_REQUEST,
                "Password must be at least 8 characters",
            ),
            AuthApiError::EmailTaken => (StatusCode::CONFLICT, "Email already registered"),
            AuthApiError::InvalidUserId => (StatusCode::BAD_REQUEST, "Invalid user ID format"),
            AuthApiError::UserNotFound => (StatusCode::NOT_FOUND, "User not found"),
            AuthApiError::CannotModifySelf => {
                (StatusCode::BAD_REQUEST, "Cannot modify your own account")
            }
            AuthApiError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_response_from_user() {
        let user = User {
            id: Uuid::new_v4(),
            display_name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "hash123".to_string(),
            role: UserRole::User,
            is_active: true,
            created_at: "2025-01-01T00:00:00Z".to_string(),
        };

        let response = UserResponse::from_user(&user);
        assert_eq!(response.email, "ada@example.com");
        assert_eq!(response.role, UserRole::User);
        assert!(response.is_active);
    }

    #[test]
    fn test_auth_api_error_responses() {
        let invalid_creds = AuthApiError::InvalidCredentials.into_response();
        assert_eq!(invalid_creds.status(), StatusCode::UNAUTHORIZED);

        let not_found = AuthApiError::UserNotFound.into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict = AuthApiError::EmailTaken.into_response();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let weak = AuthApiError::WeakPassword.into_response();
        assert_eq!(weak.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_admin_handlers_use_blocking_pool() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let store = Arc::new(UserStore::with_hash_cost(temp.path().to_str().unwrap(), 4).unwrap());
        let target = store
            .create_user("Ada", "ada@example.com", "password123", UserRole::User)
            .unwrap();
        let state = AuthState::new(
            store.clone(),
            Arc::new(JwtHandler::new(b"api-test", chrono::Duration::hours(1))),
        );
        let admin = CurrentUser(
            store
                .create_user("Root", "root@example.com", "password123", UserRole::Admin)
                .unwrap(),
        );

        let Json(users) = list_users(State(state.clone())).await.unwrap();
        assert_eq!(users.len(), 2);

        let Json(updated) = set_user_active(
            State(state.clone()),
            Extension(admin.clone()),
            Path(target.id.to_string()),
            Json(SetActiveRequest { is_active: false }),
        )
        .await
        .unwrap();
        assert!(!updated.is_active);

        let missing = set_user_role(
            State(state.clone()),
            Extension(admin.clone()),
            Path(Uuid::new_v4().to_string()),
            Json(SetRoleRequest {
                role: UserRole::Admin,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(missing, AuthApiError::UserNotFound);

        let status = delete_user(
            State(state.clone()),
            Extension(admin.clone()),
            Path(target.id.to_string()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(store.get_user_by_id(&target.id).unwrap().is_none());

        let gone = delete_user(State(state), Extension(admin), Path(target.id.to_string()))
            .await
            .unwrap_err();
        assert_eq!(gone, AuthApiError::UserNotFound);
    }

    #[test]
    fn test_admin_cannot_target_self() {
        let me = CurrentUser(User {
            id: Uuid::new_v4(),
            display_name: "Root".to_string(),
            email: "root@example.com".to_string(),
            password_hash: String::new(),
            role: UserRole::Admin,
            is_active: true,
            created_at: String::new(),
        });

        assert_eq!(
            parse_target(&me.0.id.to_string(), &me),
            Err(AuthApiError::CannotModifySelf)
        );
        assert_eq!(
            parse_target("not-a-uuid", &me),
            Err(AuthApiError::InvalidUserId)
        );
        assert!(parse_target(&Uuid::new_v4().to_string(), &me).is_ok());
    }
}
