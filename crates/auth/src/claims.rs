use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Allowed clock skew (seconds) when checking `iat` against the local clock.
pub const CLOCK_SKEW_SECS: i64 = 30;

/// `aud` may be a single string or a list in bearer tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    /// First audience entry, which is what the identity carries.
    pub fn primary(&self) -> Option<&str> {
        match self {
            Audience::Single(a) => Some(a.as_str()),
            Audience::Many(list) => list.first().map(|a| a.as_str()),
        }
    }
}

/// Bearer token claims (transport-agnostic).
///
/// This is the minimal set of claims the engine reads once a token has been
/// decoded/verified. Unknown claims are kept by the caller in the raw claim map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject / caller identifier.
    #[serde(default)]
    pub sub: Option<String>,

    /// Role the caller acts as.
    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub aud: Option<Audience>,

    /// Issued-at (seconds since epoch).
    #[serde(default)]
    pub iat: Option<i64>,

    /// Expiration (seconds since epoch).
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate the time window of token claims.
///
/// Note: this validates the *claims* only. Signature verification happens in
/// the provider that decoded the token.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), ClaimsError> {
    let now = now.timestamp();
    if let Some(iat) = claims.iat {
        if claims.exp <= iat {
            return Err(ClaimsError::InvalidTimeWindow);
        }
        if now + CLOCK_SKEW_SECS < iat {
            return Err(ClaimsError::NotYetValid);
        }
    }
    if now >= claims.exp {
        return Err(ClaimsError::Expired);
    }
    Ok(())
}
