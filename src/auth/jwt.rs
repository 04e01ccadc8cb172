//! JWT Token Handler
//! Mission: Issue and verify signed, time-bounded identity claims

use crate::auth::models::{Claims, User};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use tracing::debug;

pub const TOKEN_ISSUER: &str = "scribe-backend";
pub const TOKEN_AUDIENCE: &str = "scribe-clients";

/// Why a presented token was rejected. Logged, never returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("malformed token")]
    Malformed,
    #[error("signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("unexpected issuer")]
    WrongIssuer,
    #[error("unexpected audience")]
    WrongAudience,
}

impl From<&jsonwebtoken::errors::Error> for CredentialError {
    fn from(err: &jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => CredentialError::BadSignature,
            ErrorKind::ExpiredSignature => CredentialError::Expired,
            ErrorKind::InvalidIssuer => CredentialError::WrongIssuer,
            ErrorKind::InvalidAudience => CredentialError::WrongAudience,
            _ => CredentialError::Malformed,
        }
    }
}

/// A freshly minted token plus its lifetime in seconds
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64,
}

/// JWT Handler for token operations
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key and token lifetime
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for a user, valid from now
    pub fn issue(&self, user: &User) -> Result<IssuedToken> {
        self.issue_at(user, Utc::now())
    }

    /// Issue a token as if minted at `now`
    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<IssuedToken> {
        let expiration = now
            .checked_add_signed(self.ttl)
            .context("Invalid timestamp")?;

        let claims = Claims {
            sub: user.id.to_string(),
            name: user.display_name.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: expiration.timestamp(),
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
        };

        debug!(
            user_id = %user.id,
            role = %user.role,
            ttl_secs = self.ttl.num_seconds(),
            "Issuing JWT"
        );

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to generate JWT")?;

        Ok(IssuedToken {
            token,
            expires_in: self.ttl.num_seconds(),
        })
    }

    /// Verify signature, issuer, audience and expiry; return the claims
    pub fn decode(&self, token: &str) -> Result<Claims, CredentialError> {
        if token.is_empty() {
            return Err(CredentialError::Malformed);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| CredentialError::from(&e))?;

        // The library accepts exp == now; a claim is only valid strictly before exp.
        if claims.exp <= Utc::now().timestamp() {
            return Err(CredentialError::Expired);
        }

        Ok(claims)
    }
}
