//! JSON seed file for the in-memory directory.
//!
//! ```json
//! {
//!   "users": [
//!     { "username": "alice", "password_hash": "$argon2id$v=19$..." },
//!     { "username": "dev", "password": "dev-only-plaintext" }
//!   ],
//!   "applications": [
//!     { "name": "portal", "active": true, "grants": { "alice": ["ADMIN"] } }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use rolegate_auth::Role;
use rolegate_core::{ApplicationName, Username};

use crate::InMemoryDirectory;
use crate::password::hash_password;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub applications: Vec<SeedApplication>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedUser {
    pub username: Username,
    /// Argon2 PHC string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    /// Plaintext, hashed while loading. Development only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedApplication {
    pub name: ApplicationName,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub grants: BTreeMap<Username, Vec<Role>>,
}

fn default_active() -> bool {
    true
}

impl DirectorySeed {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("failed to parse directory seed")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read directory seed {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Build a directory holding exactly the seeded users and grants.
    pub fn into_directory(self) -> anyhow::Result<InMemoryDirectory> {
        let directory = InMemoryDirectory::new();

        for user in self.users {
            let hash = match (user.password_hash, user.password) {
                (Some(hash), _) => hash,
                (None, Some(plain)) => {
                    tracing::warn!(subject = %user.username, "seed user has a plaintext password");
                    hash_password(&plain)?
                }
                (None, None) => bail!("seed user '{}' has no password", user.username),
            };
            directory.upsert_user(user.username, hash)?;
        }

        for app in self.applications {
            directory.upsert_application(app.name.clone(), app.active)?;
            for (username, roles) in app.grants {
                for role in roles {
                    directory
                        .grant(&app.name, &username, role)
                        .with_context(|| format!("invalid grant in application '{}'", app.name))?;
                }
            }
        }

        Ok(directory)
    }
}
