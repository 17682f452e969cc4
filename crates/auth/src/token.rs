//! Signed access/refresh token issuance, verification and rotation.
//!
//! Stateless: nothing about issued tokens is stored. Rotating a refresh token
//! does not revoke the old one; it stays usable until its own `exp`.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use rolegate_core::{ApplicationName, DomainError, Username};

use crate::claims::{Claims, REFRESH_TOKEN_TYPE, TokenValidationError, validate_claims};
use crate::keys::{KeyStore, SIGNING_ALGORITHM};
use crate::{DirectoryError, Principal, Role};

pub const DEFAULT_ACCESS_TTL_SECS: i64 = 3_600;
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 604_800;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// `iss` claim of issued tokens; verified tokens must carry the same value.
    pub issuer: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "rolegate".to_string(),
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
        }
    }
}

impl TokenConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.issuer.trim().is_empty() {
            return Err(DomainError::validation("issuer must not be empty"));
        }
        if self.access_ttl_secs <= 0 || self.refresh_ttl_secs <= 0 {
            return Err(DomainError::validation("token TTLs must be positive"));
        }
        if self.refresh_ttl_secs < self.access_ttl_secs {
            return Err(DomainError::validation(
                "refresh TTL must not be shorter than access TTL",
            ));
        }
        Ok(())
    }
}

/// Freshly issued credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Why a presented token was not accepted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    #[error("malformed token")]
    Malformed,
    #[error("unsupported signature algorithm")]
    UnsupportedAlgorithm,
    #[error("missing key id")]
    MissingKeyId,
    #[error("unknown key id")]
    UnknownKey,
    #[error("bad signature")]
    BadSignature,
    #[error("wrong issuer")]
    WrongIssuer,
    #[error("expired")]
    Expired,
    #[error("not yet valid")]
    NotYetValid,
    #[error("invalid time window")]
    InvalidTimeWindow,
    #[error("wrong token type")]
    WrongType,
    #[error("missing subject")]
    MissingSubject,
    #[error("missing application")]
    MissingApplication,
    #[error("missing roles")]
    MissingRoles,
}

impl From<TokenValidationError> for TokenRejection {
    fn from(value: TokenValidationError) -> Self {
        match value {
            TokenValidationError::Expired => TokenRejection::Expired,
            TokenValidationError::NotYetValid => TokenRejection::NotYetValid,
            TokenValidationError::InvalidTimeWindow => TokenRejection::InvalidTimeWindow,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid refresh token: {0}")]
    InvalidRefreshToken(TokenRejection),

    #[error("invalid access token: {0}")]
    InvalidAccessToken(TokenRejection),

    /// The refresh token was valid but the subject's roles could not be
    /// re-resolved (user removed, application deactivated, ...).
    #[error("refresh denied: {0}")]
    RefreshDenied(DirectoryError),

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// What a verified refresh token entitles its bearer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub subject: Username,
    pub application: ApplicationName,
    pub issued_at: i64,
}

/// Looks up the current, expanded roles of a subject in an application.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    async fn resolve(
        &self,
        subject: &Username,
        application: &ApplicationName,
    ) -> Result<BTreeSet<Role>, DirectoryError>;
}

#[derive(Debug, Clone)]
pub struct TokenService {
    keys: Arc<KeyStore>,
    config: TokenConfig,
    validation: Validation,
}

impl TokenService {
    pub fn new(keys: Arc<KeyStore>, config: TokenConfig) -> Self {
        // Time claims are checked by `validate_claims` against an explicit
        // clock; audience is application-specific and checked by callers.
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation.set_issuer(&[config.issuer.as_str()]);

        Self {
            keys,
            config,
            validation,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Sign a new access/refresh pair for `subject` in `application`.
    ///
    /// `roles` must already be expanded; they are written to the access token
    /// as-is.
    pub fn issue(
        &self,
        subject: &Username,
        application: &ApplicationName,
        roles: &BTreeSet<Role>,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError> {
        let iat = now.timestamp();

        let access = Claims {
            sub: subject.to_string(),
            iss: self.config.issuer.clone(),
            aud: application.to_string(),
            iat,
            exp: iat + self.config.access_ttl_secs,
            jti: Uuid::now_v7().to_string(),
            roles: Some(roles.iter().cloned().collect()),
            token_type: None,
        };

        let refresh = Claims {
            exp: iat + self.config.refresh_ttl_secs,
            jti: Uuid::now_v7().to_string(),
            roles: None,
            token_type: Some(REFRESH_TOKEN_TYPE.to_string()),
            ..access.clone()
        };

        let sign = |claims: &Claims| {
            self.keys
                .sign(claims)
                .map_err(|e| TokenError::Signing(e.to_string()))
        };

        Ok(TokenPair {
            access_token: sign(&access)?,
            refresh_token: sign(&refresh)?,
            expires_in: self.config.access_ttl_secs,
        })
    }

    /// Verify an access token and build the principal it describes.
    ///
    /// Pure: signature, issuer, type and time checks only, no directory call.
    pub fn verify_access(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, TokenError> {
        self.principal_from(token, now)
            .map_err(TokenError::InvalidAccessToken)
    }

    fn principal_from(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, TokenRejection> {
        let claims = self.decode(token, now)?;
        if claims.token_type.is_some() {
            return Err(TokenRejection::WrongType);
        }
        let subject = Username::new(claims.sub).map_err(|_| TokenRejection::MissingSubject)?;
        let application =
            ApplicationName::new(claims.aud).map_err(|_| TokenRejection::MissingApplication)?;
        let roles = claims.roles.ok_or(TokenRejection::MissingRoles)?;

        Ok(Principal::new(subject, application, roles.into_iter().collect()))
    }

    /// Verify a refresh token: signature, expiry and `type = "refresh"`.
    pub fn verify_refresh(&self, token: &str, now: DateTime<Utc>) -> Result<RefreshGrant, TokenError> {
        self.grant_from(token, now)
            .map_err(TokenError::InvalidRefreshToken)
    }

    fn grant_from(&self, token: &str, now: DateTime<Utc>) -> Result<RefreshGrant, TokenRejection> {
        let claims = self.decode(token, now)?;
        if !claims.is_refresh() {
            return Err(TokenRejection::WrongType);
        }
        let subject = Username::new(claims.sub).map_err(|_| TokenRejection::MissingSubject)?;
        let application =
            ApplicationName::new(claims.aud).map_err(|_| TokenRejection::MissingApplication)?;

        Ok(RefreshGrant {
            subject,
            application,
            issued_at: claims.iat,
        })
    }

    /// Exchange a refresh token for a brand-new pair.
    ///
    /// Roles are re-resolved through `resolver` rather than trusted from the
    /// old token, so revoked permissions disappear on the next refresh.
    pub async fn refresh<R>(
        &self,
        refresh_token: &str,
        resolver: &R,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError>
    where
        R: RoleResolver + ?Sized,
    {
        let grant = self.verify_refresh(refresh_token, now)?;
        let roles = resolver
            .resolve(&grant.subject, &grant.application)
            .await
            .map_err(TokenError::RefreshDenied)?;

        self.issue(&grant.subject, &grant.application, &roles, now)
    }

    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenRejection> {
        let header = decode_header(token).map_err(|_| TokenRejection::Malformed)?;
        if header.alg != SIGNING_ALGORITHM {
            return Err(TokenRejection::UnsupportedAlgorithm);
        }
        let kid = header.kid.ok_or(TokenRejection::MissingKeyId)?;
        let key = self
            .keys
            .verification_key(&kid)
            .ok_or(TokenRejection::UnknownKey)?;

        let data = decode::<Claims>(token, key.decoding_key(), &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenRejection::BadSignature,
                ErrorKind::InvalidIssuer => TokenRejection::WrongIssuer,
                ErrorKind::InvalidAlgorithm => TokenRejection::UnsupportedAlgorithm,
                _ => TokenRejection::Malformed,
            }
        })?;

        validate_claims(&data.claims, now.timestamp())?;
        Ok(data.claims)
    }
}
