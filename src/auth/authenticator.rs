//! Authentication Middleware
//! Mission: Resolve the live identity behind a bearer token on every request

use crate::auth::{
    error::AuthError,
    extract::extract_bearer,
    jwt::JwtHandler,
    models::{CurrentUser, User},
    user_store::IdentityStore,
};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, warn};
use uuid::Uuid;

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Token decode plus a fresh identity lookup, so role changes and
/// deactivation apply before the token expires.
pub struct Authenticator {
    jwt: Arc<JwtHandler>,
    store: Arc<dyn IdentityStore>,
    lookup_timeout: Duration,
}

impl Authenticator {
    pub fn new(jwt: Arc<JwtHandler>, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            jwt,
            store,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    pub fn jwt(&self) -> &JwtHandler {
        &self.jwt
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<User, AuthError> {
        let token = extract_bearer(headers).ok_or(AuthError::NO_CREDENTIAL)?;

        let claims = self.jwt.decode(token).map_err(|reason| {
            debug!(%reason, "Rejected bearer token");
            AuthError::INVALID_CREDENTIAL
        })?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| {
            debug!(sub = %claims.sub, "Token subject is not a user id");
            AuthError::INVALID_CREDENTIAL
        })?;

        let lookup = tokio::time::timeout(self.lookup_timeout, self.store.find_by_id(user_id));
        let user = match lookup.await {
            Ok(Ok(Some(user))) => user,
            Ok(Ok(None)) => {
                debug!(user_id = %user_id, "Token subject no longer exists");
                return Err(AuthError::IDENTITY_NOT_FOUND);
            }
            Ok(Err(e)) => {
                error!(user_id = %user_id, error = %e, "Identity lookup failed");
                return Err(AuthError::ServiceUnavailable);
            }
            Err(_) => {
                warn!(
                    user_id = %user_id,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Identity lookup timed out"
                );
                return Err(AuthError::ServiceUnavailable);
            }
        };

        if !user.is_active {
            debug!(user_id = %user.id, "Token presented for deactivated account");
            return Err(AuthError::ACCOUNT_DEACTIVATED);
        }

        Ok(user)
    }
}

/// Auth middleware that attaches `CurrentUser` for downstream handlers
pub async fn auth_middleware(
    State(authenticator): State<Arc<Authenticator>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = authenticator.authenticate(req.headers()).await?;

    req.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(req).await)
}

/// Extract the resolved identity from a request (use after auth middleware)
pub fn current_user(req: &Request) -> Option<&CurrentUser> {
    req.extensions().get::<CurrentUser>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::UserRole;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, HeaderValue},
    };
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStore {
        users: Mutex<HashMap<Uuid, User>>,
    }

    impl MemoryStore {
        fn insert(&self, user: User) {
            self.users.lock().insert(user.id, user);
        }
    }

    #[async_trait]
    impl IdentityStore for MemoryStore {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
            Ok(self.users.lock().get(&id).cloned())
        }

        async fn find_by_credentials(&self, _email: &str, _password: &str) -> Result<Option<User>> {
            Ok(None)
        }
    }

    struct SlowStore;

    #[async_trait]
    impl IdentityStore for SlowStore {
        async fn find_by_id(&self, _id: Uuid) -> Result<Option<User>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn find_by_credentials(&self, _email: &str, _password: &str) -> Result<Option<User>> {
            Ok(None)
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl IdentityStore for BrokenStore {
        async fn find_by_id(&self, _id: Uuid) -> Result<Option<User>> {
            anyhow::bail!("database is locked")
        }

        async fn find_by_credentials(&self, _email: &str, _password: &str) -> Result<Option<User>> {
            Ok(None)
        }
    }

    fn test_user(role: UserRole, is_active: bool) -> User {
        User {
            id: Uuid::new_v4(),
            display_name: "Reader".to_string(),
            email: "reader@example.com".to_string(),
            password_hash: "hash".to_string(),
            role,
            is_active,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn jwt() -> Arc<JwtHandler> {
        Arc::new(JwtHandler::new(
            b"authenticator-test-secret",
            chrono::Duration::hours(1),
        ))
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_authenticates_active_user() {
        let store = Arc::new(MemoryStore::default());
        let user = test_user(UserRole::User, true);
        store.insert(user.clone());
        let auth = Authenticator::new(jwt(), store);

        let token = auth.jwt().issue(&user).unwrap().token;
        let resolved = auth.authenticate(&bearer(&token)).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let auth = Authenticator::new(jwt(), Arc::new(MemoryStore::default()));
        let err = auth.authenticate(&HeaderMap::new()).await.unwrap_err();
        assert_eq!(err, AuthError::NO_CREDENTIAL);
    }

    #[tokio::test]
    async fn test_invalid_credential() {
        let auth = Authenticator::new(jwt(), Arc::new(MemoryStore::default()));
        let err = auth.authenticate(&bearer("garbage")).await.unwrap_err();
        assert_eq!(err, AuthError::INVALID_CREDENTIAL);
    }

    #[tokio::test]
    async fn test_unknown_subject() {
        let auth = Authenticator::new(jwt(), Arc::new(MemoryStore::default()));
        let ghost = test_user(UserRole::User, true);
        let token = auth.jwt().issue(&ghost).unwrap().token;

        let err = auth.authenticate(&bearer(&token)).await.unwrap_err();
        assert_eq!(err, AuthError::IDENTITY_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deactivated_account_rejected() {
        let store = Arc::new(MemoryStore::default());
        let user = test_user(UserRole::User, false);
        store.insert(user.clone());
        let auth = Authenticator::new(jwt(), store);

        let token = auth.jwt().issue(&user).unwrap().token;
        let err = auth.authenticate(&bearer(&token)).await.unwrap_err();
        assert_eq!(err, AuthError::ACCOUNT_DEACTIVATED);
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_live_role_wins_over_claim() {
        let store = Arc::new(MemoryStore::default());
        let mut user = test_user(UserRole::Admin, true);
        store.insert(user.clone());
        let auth = Authenticator::new(jwt(), store.clone());
        let token = auth.jwt().issue(&user).unwrap().token;

        user.role = UserRole::User;
        store.insert(user);

        let resolved = auth.authenticate(&bearer(&token)).await.unwrap();
        assert_eq!(resolved.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_lookup_timeout_is_service_unavailable() {
        let auth = Authenticator::new(jwt(), Arc::new(SlowStore))
            .with_lookup_timeout(Duration::from_millis(50));
        let token = auth
            .jwt()
            .issue(&test_user(UserRole::User, true))
            .unwrap()
            .token;

        let err = auth.authenticate(&bearer(&token)).await.unwrap_err();
        assert_eq!(err, AuthError::ServiceUnavailable);
    }

    #[tokio::test]
    async fn test_store_failure_is_service_unavailable() {
        let auth = Authenticator::new(jwt(), Arc::new(BrokenStore));
        let token = auth
            .jwt()
            .issue(&test_user(UserRole::User, true))
            .unwrap()
            .token;

        let err = auth.authenticate(&bearer(&token)).await.unwrap_err();
        assert_eq!(err, AuthError::ServiceUnavailable);
    }

    #[test]
    fn test_current_user_from_request() {
        let mut req = Request::new(Body::empty());
        assert!(current_user(&req).is_none());

        req.extensions_mut()
            .insert(CurrentUser(test_user(UserRole::User, true)));
        assert_eq!(current_user(&req).unwrap().role(), UserRole::User);
    }
}
