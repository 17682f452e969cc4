//! Per-request entry points: login, refresh and access-token authentication.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use thiserror::Error;

use rolegate_core::{ApplicationName, Username};

use crate::token::RoleResolver;
use crate::{
    ApplicationRoleDirectory, DirectoryError, Principal, Role, RoleHierarchy, TokenError,
    TokenPair, TokenService, UserCredentialVerifier,
};

/// Username/password pair from an HTTP Basic `Authorization` header.
#[derive(Clone)]
pub struct BasicCredentials {
    pub username: Username,
    pub password: String,
}

impl BasicCredentials {
    pub fn new(username: Username, password: impl Into<String>) -> Self {
        Self {
            username,
            password: password.into(),
        }
    }

    /// Parse `Basic base64(username:password)`. The scheme is case-insensitive.
    pub fn from_authorization_header(value: &str) -> Option<Self> {
        let (scheme, encoded) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self::new(Username::new(username).ok()?, password))
    }
}

impl core::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("bad credentials")]
    BadCredentials,

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("token was issued for another application")]
    ApplicationMismatch,
}

impl GatewayError {
    /// Stable reason code for logs; clients only learn that authentication failed.
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::BadCredentials => "bad_credentials",
            GatewayError::Directory(e) => e.reason(),
            GatewayError::Token(TokenError::RefreshDenied(e)) => e.reason(),
            GatewayError::Token(TokenError::InvalidRefreshToken(_)) => "invalid_refresh_token",
            GatewayError::Token(TokenError::InvalidAccessToken(_)) => "invalid_access_token",
            GatewayError::Token(TokenError::Signing(_)) => "signing_failed",
            GatewayError::ApplicationMismatch => "application_mismatch",
        }
    }
}

/// Resolves roles through the directory and expands them through the hierarchy.
#[derive(Clone)]
pub struct DirectoryRoleResolver {
    directory: Arc<dyn ApplicationRoleDirectory>,
    hierarchy: Arc<RoleHierarchy>,
}

impl DirectoryRoleResolver {
    pub fn new(directory: Arc<dyn ApplicationRoleDirectory>, hierarchy: Arc<RoleHierarchy>) -> Self {
        Self {
            directory,
            hierarchy,
        }
    }

    async fn ensure_active(&self, application: &ApplicationName) -> Result<(), DirectoryError> {
        if self.directory.is_application_active(application).await? {
            Ok(())
        } else {
            Err(DirectoryError::ApplicationInactive(application.clone()))
        }
    }

    /// Granted roles closed under the hierarchy. Callers check the application first.
    async fn expanded_roles(
        &self,
        subject: &Username,
        application: &ApplicationName,
    ) -> Result<BTreeSet<Role>, DirectoryError> {
        let granted = self.directory.roles_for(subject, application).await?;
        Ok(self.hierarchy.expand(&granted))
    }
}

#[async_trait]
impl RoleResolver for DirectoryRoleResolver {
    async fn resolve(
        &self,
        subject: &Username,
        application: &ApplicationName,
    ) -> Result<BTreeSet<Role>, DirectoryError> {
        self.ensure_active(application).await?;
        self.expanded_roles(subject, application).await
    }
}

pub struct AuthorizationGateway {
    tokens: Arc<TokenService>,
    credentials: Arc<dyn UserCredentialVerifier>,
    roles: DirectoryRoleResolver,
}

impl AuthorizationGateway {
    pub fn new(
        tokens: Arc<TokenService>,
        credentials: Arc<dyn UserCredentialVerifier>,
        directory: Arc<dyn ApplicationRoleDirectory>,
        hierarchy: Arc<RoleHierarchy>,
    ) -> Self {
        Self {
            tokens,
            credentials,
            roles: DirectoryRoleResolver::new(directory, hierarchy),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Authenticate credentials for `application` and issue a token pair.
    ///
    /// The application is checked before the credentials, so a request for an
    /// inactive application learns nothing about the username.
    #[tracing::instrument(skip_all, fields(application = %application))]
    pub async fn login(
        &self,
        credentials: &BasicCredentials,
        application: &ApplicationName,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, GatewayError> {
        let result = self.try_login(credentials, application, now).await;
        match &result {
            Ok(_) => tracing::info!(subject = %credentials.username, "login succeeded"),
            Err(e) => tracing::warn!(
                subject = %credentials.username,
                reason = e.reason(),
                "login rejected"
            ),
        }
        result
    }

    async fn try_login(
        &self,
        credentials: &BasicCredentials,
        application: &ApplicationName,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, GatewayError> {
        self.roles.ensure_active(application).await?;

        if !self
            .credentials
            .verify(&credentials.username, &credentials.password)
            .await?
        {
            return Err(GatewayError::BadCredentials);
        }

        let roles = self
            .roles
            .expanded_roles(&credentials.username, application)
            .await?;
        Ok(self
            .tokens
            .issue(&credentials.username, application, &roles, now)?)
    }

    /// Rotate a refresh token. Roles are looked up again, not copied.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, GatewayError> {
        let result = self
            .tokens
            .refresh(refresh_token, &self.roles, now)
            .await
            .map_err(GatewayError::from);
        if let Err(e) = &result {
            tracing::warn!(reason = e.reason(), error = %e, "refresh rejected");
        }
        result
    }

    /// Hot path: verify an access token without touching the directory.
    ///
    /// When the request names an application it must be the one the token was
    /// issued for.
    pub fn authenticate(
        &self,
        access_token: &str,
        application: Option<&ApplicationName>,
        now: DateTime<Utc>,
    ) -> Result<Principal, GatewayError> {
        let principal = self.tokens.verify_access(access_token, now)?;
        match application {
            Some(app) if app != principal.application() => Err(GatewayError::ApplicationMismatch),
            _ => Ok(principal),
        }
    }
}
