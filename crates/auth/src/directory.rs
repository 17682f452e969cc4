//! Collaborator contracts the core consumes: credential checks and
//! application-scoped role lookup.
//!
//! Implementations may block on a database; both are only called on the login
//! and refresh paths, never while verifying an access token.

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use rolegate_core::{ApplicationName, Username};

use crate::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("unknown application '{0}'")]
    UnknownApplication(ApplicationName),

    #[error("application '{0}' is inactive")]
    ApplicationInactive(ApplicationName),

    #[error("unknown user '{0}'")]
    UnknownUser(Username),

    /// The backing store could not answer (connection lost, timeout, ...).
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

impl DirectoryError {
    /// Stable reason code for logs; never sent to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            DirectoryError::UnknownApplication(_) => "unknown_application",
            DirectoryError::ApplicationInactive(_) => "application_inactive",
            DirectoryError::UnknownUser(_) => "unknown_user",
            DirectoryError::Unavailable(_) => "directory_unavailable",
        }
    }
}

/// Checks a username/password pair against the user store.
#[async_trait]
pub trait UserCredentialVerifier: Send + Sync {
    async fn verify(&self, username: &Username, password: &str) -> Result<bool, DirectoryError>;
}

/// Roles granted to users, scoped per application.
///
/// A user's grants in one application must never appear in a lookup for
/// another.
#[async_trait]
pub trait ApplicationRoleDirectory: Send + Sync {
    /// Directly granted (unexpanded) roles of `username` within `application`.
    ///
    /// Fails for unknown or inactive applications and unknown users.
    async fn roles_for(
        &self,
        username: &Username,
        application: &ApplicationName,
    ) -> Result<BTreeSet<Role>, DirectoryError>;

    /// `Ok(false)` for a known but inactive application; an unknown one fails
    /// with [`DirectoryError::UnknownApplication`].
    async fn is_application_active(
        &self,
        application: &ApplicationName,
    ) -> Result<bool, DirectoryError>;
}
