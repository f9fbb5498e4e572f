//! Signed session tokens.
//!
//! The token is an HS256 JWT whose only payload is the session id. The
//! session's task binding lives server-side in the session store for the
//! same lifetime; the token just proves which session the client holds.

use std::time::Duration;

use advex_core::session::SessionId;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "advex_session";

const DEFAULT_TTL_DAYS: i64 = 31;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    /// Session id.
    pub sid: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HMAC-SHA256 secret used to sign and verify tokens.
    pub secret: String,
    /// Token and cookie lifetime in days (default: 31).
    pub ttl_days: i64,
}

impl SessionConfig {
    /// Load session configuration from environment variables.
    ///
    /// | Env Var            | Required | Default |
    /// |--------------------|----------|---------|
    /// | `SESSION_SECRET`   | **yes**  | --      |
    /// | `SESSION_TTL_DAYS` | no       | `31`    |
    ///
    /// # Panics
    ///
    /// Panics if `SESSION_SECRET` is not set or is empty.
    pub fn from_env() -> Self {
        let secret =
            std::env::var("SESSION_SECRET").expect("SESSION_SECRET must be set in the environment");
        assert!(!secret.is_empty(), "SESSION_SECRET must not be empty");

        let ttl_days: i64 = std::env::var("SESSION_TTL_DAYS")
            .unwrap_or_else(|_| DEFAULT_TTL_DAYS.to_string())
            .parse()
            .expect("SESSION_TTL_DAYS must be a valid i64");

        Self { secret, ttl_days }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_days * 24 * 60 * 60
    }

    /// Lifetime as a duration; a non-positive TTL is zero.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.ttl_secs()).unwrap_or(0))
    }
}

pub fn issue_token(
    session: &SessionId,
    config: &SessionConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = SessionClaims {
        sid: session.to_string(),
        exp: now + config.ttl_secs(),
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Check signature and expiry, returning the session id.
pub fn validate_token(
    token: &str,
    config: &SessionConfig,
) -> Result<SessionId, jsonwebtoken::errors::Error> {
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(SessionId::from(data.claims.sid))
}
