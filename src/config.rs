//! Service configuration from the environment.

use anyhow::{bail, Context, Result};
use std::{env, time::Duration};
use tracing::warn;

/// Fallback signing secret for local development only.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub environment: Environment,
    pub jwt_secret: Vec<u8>,
    pub token_ttl: chrono::Duration,
    pub lookup_timeout: Duration,
    pub admin_seed: Option<(String, String)>,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, so tests need not touch process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("APP_ENV")
            .map(|v| Environment::parse(&v))
            .unwrap_or(Environment::Development);

        let jwt_secret = resolve_secret(environment, lookup("JWT_SECRET"))?;

        let ttl_hours = match lookup("JWT_TTL_HOURS") {
            Some(raw) => raw
                .parse::<i64>()
                .with_context(|| format!("Invalid JWT_TTL_HOURS: {raw}"))?,
            None => 24,
        };
        if ttl_hours <= 0 {
            bail!("JWT_TTL_HOURS must be positive");
        }

        let lookup_timeout_ms = match lookup("IDENTITY_LOOKUP_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("Invalid IDENTITY_LOOKUP_TIMEOUT_MS: {raw}"))?,
            None => 5_000,
        };

        let admin_seed = match (lookup("ADMIN_EMAIL"), lookup("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some((email, password)),
            (Some(_), None) | (None, Some(_)) => {
                warn!("ADMIN_EMAIL and ADMIN_PASSWORD must both be set; skipping admin seed");
                None
            }
            (None, None) => None,
        };

        Ok(Self {
            environment,
            jwt_secret,
            token_ttl: chrono::Duration::hours(ttl_hours),
            lookup_timeout: Duration::from_millis(lookup_timeout_ms),
            admin_seed,
        })
    }
}

fn resolve_secret(environment: Environment, configured: Option<String>) -> Result<Vec<u8>> {
    let configured = configured.filter(|s| !s.is_empty());

    match (environment, configured) {
        (Environment::Production, None) => {
            bail!("JWT_SECRET must be set when APP_ENV=production")
        }
        (Environment::Production, Some(secret)) if secret == DEV_JWT_SECRET => {
            bail!("JWT_SECRET is the development default; refusing to start in production")
        }
        (Environment::Production, Some(secret)) if secret.len() < MIN_SECRET_LEN => {
            bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes in production")
        }
        (_, Some(secret)) => Ok(secret.into_bytes()),
        (Environment::Development, None) => {
            warn!("⚠️  JWT_SECRET not set, using development secret. NEVER DO THIS IN PRODUCTION!");
            Ok(DEV_JWT_SECRET.as_bytes().to_vec())
        }
    }
}
