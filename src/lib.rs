//! Scribe Backend Library
//!
//! Authentication, authorization and admission control for the Scribe blog
//! API. Exposed as a library so the binary and integration tests share one
//! router.

pub mod app;
pub mod auth;
pub mod config;
pub mod middleware;

pub use app::{build_router, AppState};
