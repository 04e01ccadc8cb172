//! Router assembly.

use crate::{
    auth::{
        api as auth_api, auth_middleware, require_roles, AuthState, Authenticator, JwtHandler,
        RoleGate, UserStore,
    },
    middleware::{rate_limit_middleware, request_logging, RateLimitConfig, SlidingWindowLimiter},
};
use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::{sync::Arc, time::Duration};
use tower_http::cors::CorsLayer;

/// Login: 5 attempts per minute per client
pub fn login_rate_limit() -> RateLimitConfig {
    RateLimitConfig::new(5, Duration::from_secs(60))
}

/// Registration: 3 accounts per hour per client
pub fn register_rate_limit() -> RateLimitConfig {
    RateLimitConfig::new(3, Duration::from_secs(3600))
}

/// Everything the router needs, owned by the composing application
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub authenticator: Arc<Authenticator>,
    pub login_limiter: SlidingWindowLimiter,
    pub register_limiter: SlidingWindowLimiter,
}

impl AppState {
    pub fn new(
        user_store: Arc<UserStore>,
        jwt_handler: Arc<JwtHandler>,
        lookup_timeout: Duration,
    ) -> Self {
        let authenticator = Authenticator::new(jwt_handler.clone(), user_store.clone())
            .with_lookup_timeout(lookup_timeout);

        Self {
            auth: AuthState::new(user_store, jwt_handler),
            authenticator: Arc::new(authenticator),
            login_limiter: SlidingWindowLimiter::new(login_rate_limit()),
            register_limiter: SlidingWindowLimiter::new(register_rate_limit()),
        }
    }

    pub fn with_limiters(
        mut self,
        login: SlidingWindowLimiter,
        register: SlidingWindowLimiter,
    ) -> Self {
        self.login_limiter = login;
        self.register_limiter = register;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let login_routes = Router::new()
        .route("/api/auth/login", post(auth_api::login))
        .route_layer(middleware::from_fn_with_state(
            state.login_limiter.clone(),
            rate_limit_middleware,
        ));

    let register_routes = Router::new()
        .route("/api/auth/register", post(auth_api::register))
        .route_layer(middleware::from_fn_with_state(
            state.register_limiter.clone(),
            rate_limit_middleware,
        ));

    // Role gate sits inside the authenticator, so it always sees CurrentUser
    let admin_routes = Router::new()
        .route("/api/admin/users", get(auth_api::list_users))
        .route(
            "/api/admin/users/:id/active",
            patch(auth_api::set_user_active),
        )
        .route("/api/admin/users/:id/role", patch(auth_api::set_user_role))
        .route("/api/admin/users/:id", delete(auth_api::delete_user))
        .route_layer(middleware::from_fn_with_state(
            RoleGate::admin_only(),
            require_roles,
        ));

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth_api::get_current_user))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            auth_middleware,
        ));

    let auth_router = Router::new()
        .merge(login_routes)
        .merge(register_routes)
        .merge(protected_routes)
        .with_state(state.auth);

    Router::new()
        .route("/health", get(health_check))
        .merge(auth_router)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
