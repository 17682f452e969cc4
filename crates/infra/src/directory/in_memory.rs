use std::collections::{BTreeSet, HashMap};
use std::sync::{OnceLock, RwLock};

use async_trait::async_trait;

use rolegate_auth::{ApplicationRoleDirectory, DirectoryError, Role, UserCredentialVerifier};
use rolegate_core::{ApplicationName, Username};

use crate::password::{hash_password, verify_password};

#[derive(Debug, Clone, Default)]
struct ApplicationRecord {
    active: bool,
    grants: HashMap<Username, BTreeSet<Role>>,
}

/// In-memory user directory for tests, development and seeded deployments.
///
/// Users are global; role grants are held per application, so a lookup in
/// one application never sees another application's grants.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    password_hashes: RwLock<HashMap<Username, String>>,
    applications: RwLock<HashMap<ApplicationName, ApplicationRecord>>,
}

fn poisoned() -> DirectoryError {
    DirectoryError::Unavailable("lock poisoned".to_string())
}

/// Hash checked for unknown users so they cost the same as known ones.
fn decoy_hash() -> Option<&'static str> {
    static DECOY: OnceLock<Option<String>> = OnceLock::new();
    DECOY
        .get_or_init(|| hash_password("rolegate-decoy-password").ok())
        .as_deref()
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user with an Argon2 PHC password hash.
    pub fn upsert_user(&self, username: Username, password_hash: String) -> Result<(), DirectoryError> {
        self.password_hashes
            .write()
            .map_err(|_| poisoned())?
            .insert(username, password_hash);
        Ok(())
    }

    /// Remove a user and every grant they hold.
    pub fn remove_user(&self, username: &Username) -> Result<(), DirectoryError> {
        self.password_hashes
            .write()
            .map_err(|_| poisoned())?
            .remove(username);
        for app in self.applications.write().map_err(|_| poisoned())?.values_mut() {
            app.grants.remove(username);
        }
        Ok(())
    }

    /// Register an application (or update its active flag, keeping grants).
    pub fn upsert_application(
        &self,
        application: ApplicationName,
        active: bool,
    ) -> Result<(), DirectoryError> {
        self.applications
            .write()
            .map_err(|_| poisoned())?
            .entry(application)
            .or_default()
            .active = active;
        Ok(())
    }

    /// Grant `role` to a known user within a known application.
    pub fn grant(
        &self,
        application: &ApplicationName,
        username: &Username,
        role: Role,
    ) -> Result<(), DirectoryError> {
        if !self
            .password_hashes
            .read()
            .map_err(|_| poisoned())?
            .contains_key(username)
        {
            return Err(DirectoryError::UnknownUser(username.clone()));
        }

        let mut apps = self.applications.write().map_err(|_| poisoned())?;
        let app = apps
            .get_mut(application)
            .ok_or_else(|| DirectoryError::UnknownApplication(application.clone()))?;
        app.grants.entry(username.clone()).or_default().insert(role);
        Ok(())
    }

    /// Revoke `role`; the user stays a member of the application.
    pub fn revoke(
        &self,
        application: &ApplicationName,
        username: &Username,
        role: &Role,
    ) -> Result<(), DirectoryError> {
        let mut apps = self.applications.write().map_err(|_| poisoned())?;
        let app = apps
            .get_mut(application)
            .ok_or_else(|| DirectoryError::UnknownApplication(application.clone()))?;
        if let Some(roles) = app.grants.get_mut(username) {
            roles.remove(role);
        }
        Ok(())
    }

    fn password_hash(&self, username: &Username) -> Result<Option<String>, DirectoryError> {
        Ok(self
            .password_hashes
            .read()
            .map_err(|_| poisoned())?
            .get(username)
            .cloned())
    }
}

#[async_trait]
impl ApplicationRoleDirectory for InMemoryDirectory {
    /// A user who exists but has no membership in `application` is unknown
    /// there.
    async fn roles_for(
        &self,
        username: &Username,
        application: &ApplicationName,
    ) -> Result<BTreeSet<Role>, DirectoryError> {
        let apps = self.applications.read().map_err(|_| poisoned())?;
        let app = apps
            .get(application)
            .ok_or_else(|| DirectoryError::UnknownApplication(application.clone()))?;
        if !app.active {
            return Err(DirectoryError::ApplicationInactive(application.clone()));
        }
        app.grants
            .get(username)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownUser(username.clone()))
    }

    async fn is_application_active(
        &self,
        application: &ApplicationName,
    ) -> Result<bool, DirectoryError> {
        self.applications
            .read()
            .map_err(|_| poisoned())?
            .get(application)
            .map(|app| app.active)
            .ok_or_else(|| DirectoryError::UnknownApplication(application.clone()))
    }
}

#[async_trait]
impl UserCredentialVerifier for InMemoryDirectory {
    async fn verify(&self, username: &Username, password: &str) -> Result<bool, DirectoryError> {
        let stored = self.password_hash(username)?;
        let known = stored.is_some();
        let Some(hash) = stored.or_else(|| decoy_hash().map(str::to_string)) else {
            return Ok(false);
        };

        // Argon2 blocks; run it on the blocking pool.
        let password = password.to_string();
        let matched = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?
            .map_err(|e| {
                tracing::error!(subject = %username, error = %e, "stored password hash unusable");
                DirectoryError::Unavailable("credential store error".to_string())
            })?;

        Ok(known && matched)
    }
}
