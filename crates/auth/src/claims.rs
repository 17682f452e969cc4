use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Role;

/// Value of the `type` claim on refresh tokens.
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Tolerated clock difference between issuer and verifier, in seconds.
///
/// Applies to `iat` only; `exp` is never extended.
pub const CLOCK_SKEW_SECS: i64 = 60;

/// Token payload. All timestamps are epoch seconds.
///
/// Access tokens carry the already-expanded `roles` and no `type`; refresh
/// tokens carry `type = "refresh"` and no roles, since roles are re-derived
/// when the refresh token is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the username.
    #[serde(default)]
    pub sub: String,

    pub iss: String,

    /// Audience: the application the token was issued for.
    #[serde(default)]
    pub aud: String,

    pub iat: i64,

    pub exp: i64,

    /// Unique token id, so two tokens minted in the same second differ.
    pub jti: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Role>>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Claims {
    pub fn is_refresh(&self) -> bool {
        self.token_type.as_deref() == Some(REFRESH_TOKEN_TYPE)
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the time claims against `now` (epoch seconds).
///
/// Signature verification happens before this, in [`crate::TokenService`].
pub fn validate_claims(claims: &Claims, now: i64) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now + CLOCK_SKEW_SECS < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
