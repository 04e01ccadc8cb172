//! Authentication Module
//! Mission: Secure API access with JWT tokens, live identity checks and RBAC

pub mod api;
pub mod authenticator;
pub mod authorize;
pub mod error;
pub mod extract;
pub mod jwt;
pub mod models;
pub mod user_store;

pub use api::AuthState;
pub use authenticator::{auth_middleware, current_user, Authenticator};
pub use authorize::{require_roles, RoleGate};
pub use error::AuthError;
pub use jwt::JwtHandler;
pub use user_store::{IdentityStore, UserStore};
