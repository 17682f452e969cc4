//! Service configuration.
//!
//! Sources are merged in this order (later sources override earlier):
//! 1. Defaults from `AppConfig::default()`
//! 2. TOML file from `ROLEGATE_CONFIG`, or `rolegate.toml` when it exists
//! 3. Environment variables prefixed `ROLEGATE_`, `__` separating nested keys
//!    (e.g. `ROLEGATE_TOKENS__ACCESS_TTL_SECS=900`)
//!
//! Environment keys are case-folded, so the case-sensitive role names under
//! `roles` can only be configured in the TOML file; `ROLEGATE_ROLES*`
//! variables are ignored.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rolegate_auth::{
    KeyId, KeyIdScheme, KeyParseError, KeyStore, Role, RoleHierarchy, TokenConfig,
    load_public_key,
};
use rolegate_observability::LogFormat;

pub const CONFIG_PATH_ENV: &str = "ROLEGATE_CONFIG";
pub const DEFAULT_CONFIG_FILENAME: &str = "rolegate.toml";
pub const ENV_PREFIX: &str = "ROLEGATE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid key material in {field}: {source}")]
    Keys {
        field: String,
        #[source]
        source: KeyParseError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub tokens: TokenConfig,
    pub keys: KeysConfig,
    pub roles: RolesConfig,
    pub directory: DirectoryConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyIdKind {
    #[default]
    Thumbprint,
    Dated,
}

/// Signing key material: PEM text or base64-encoded DER.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub private_key: Option<String>,
    pub public_key: Option<String>,
    /// Public halves of previous signing keys, still accepted for verification.
    pub retired_public_keys: Vec<RetiredKeyConfig>,
    pub key_id: KeyIdKind,
    /// Prefix of dated key ids.
    pub key_id_prefix: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            public_key: None,
            retired_public_keys: Vec::new(),
            key_id: KeyIdKind::Thumbprint,
            key_id_prefix: "rolegate-".to_string(),
        }
    }
}

impl core::fmt::Debug for KeysConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeysConfig")
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("public_key", &self.public_key.is_some())
            .field("retired_public_keys", &self.retired_public_keys.len())
            .field("key_id", &self.key_id)
            .field("key_id_prefix", &self.key_id_prefix)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetiredKeyConfig {
    pub public_key: String,
    /// Id the key was published under; defaults to its thumbprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

impl KeysConfig {
    pub fn scheme(&self) -> KeyIdScheme {
        match self.key_id {
            KeyIdKind::Thumbprint => KeyIdScheme::Thumbprint,
            KeyIdKind::Dated => KeyIdScheme::Dated {
                prefix: self.key_id_prefix.clone(),
            },
        }
    }

    /// Parse the configured keys into a store. Any failure is fatal.
    pub fn build_store(&self, loaded_at: DateTime<Utc>) -> Result<KeyStore, ConfigError> {
        let private = self
            .private_key
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("keys.private_key is required".to_string()))?;
        let public = self
            .public_key
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("keys.public_key is required".to_string()))?;

        let mut store = KeyStore::load(
            private.as_bytes(),
            public.as_bytes(),
            &self.scheme(),
            loaded_at,
        )
        .map_err(|source| ConfigError::Keys {
            field: "keys.private_key/keys.public_key".to_string(),
            source,
        })?;

        for (i, retired) in self.retired_public_keys.iter().enumerate() {
            let field = format!("keys.retired_public_keys[{i}]");
            let key = load_public_key(retired.public_key.as_bytes()).map_err(|source| {
                ConfigError::Keys {
                    field: field.clone(),
                    source,
                }
            })?;
            store = store
                .with_retired(key, retired.key_id.clone().map(KeyId::new))
                .map_err(|source| ConfigError::Keys { field, source })?;
        }

        Ok(store)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    /// `role -> roles it directly implies`. Read from the TOML file only.
    pub implies: BTreeMap<Role, Vec<Role>>,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            implies: BTreeMap::from([
                (Role::SYSTEM, vec![Role::ADMIN]),
                (Role::ADMIN, vec![Role::USER]),
            ]),
        }
    }
}

impl RolesConfig {
    pub fn hierarchy(&self) -> RoleHierarchy {
        RoleHierarchy::from_edges(self.implies.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// JSON seed for the in-memory directory; without one the directory is empty.
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tokens
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("tokens: {e}")))?;
        self.server
            .bind_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid(format!("server.bind_addr: {e}")))?;
        if self.keys.key_id == KeyIdKind::Dated && self.keys.key_id_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "keys.key_id_prefix must not be empty for dated key ids".to_string(),
            ));
        }
        Ok(())
    }
}

/// Layered configuration loader.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Loader honouring `ROLEGATE_CONFIG`.
    pub fn from_env() -> Self {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::new().with_config_path(path),
            None => Self::new(),
        }
    }

    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// The merged sources, before extraction.
    pub fn figment(&self) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));

        let path = self
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(
            Env::prefixed(&self.env_prefix)
                .split("__")
                .filter(|key| !is_role_key(key.as_str())),
        )
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        extract(self.figment())
    }
}

fn is_role_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key == "roles" || key.starts_with("roles.")
}

/// Extract and validate a configuration from merged sources.
pub fn extract(figment: Figment) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    const PRIMARY_PRIVATE: &str = include_str!("../../auth/testdata/primary_private.pem");
    const PRIMARY_PUBLIC: &str = include_str!("../../auth/testdata/primary_public.pem");
    const SECONDARY_PUBLIC: &str = include_str!("../../auth/testdata/secondary_public.pem");

    fn loader() -> ConfigLoader {
        ConfigLoader::new()
            .with_config_path("does-not-exist.toml")
            .with_env_prefix("ROLEGATE_CONFIG_TEST_UNSET_")
    }

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-19T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn defaults_load_and_validate() {
        let config = loader().load().unwrap();
        assert_eq!(config.tokens.access_ttl_secs, 3_600);
        assert_eq!(config.tokens.refresh_ttl_secs, 604_800);
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.roles.hierarchy(), RoleHierarchy::standard());
    }

    #[test]
    fn toml_overrides_defaults() {
        let figment = loader().figment().merge(Toml::string(
            r#"
            [tokens]
            issuer = "https://id.example.test"
            access_ttl_secs = 900

            [keys]
            key_id = "dated"
            key_id_prefix = "corp-"

            [roles.implies]
            OWNER = ["SYSTEM"]
            SYSTEM = ["ADMIN"]

            [log]
            format = "pretty"
            "#,
        ));
        let config = extract(figment).unwrap();

        assert_eq!(config.tokens.issuer, "https://id.example.test");
        assert_eq!(config.tokens.access_ttl_secs, 900);
        assert_eq!(config.tokens.refresh_ttl_secs, 604_800);
        assert_eq!(
            config.keys.scheme(),
            KeyIdScheme::Dated {
                prefix: "corp-".to_string()
            }
        );
        assert_eq!(config.log.format, LogFormat::Pretty);
        // Configured entries merge with the defaults by role.
        let hierarchy = config.roles.hierarchy();
        assert_eq!(hierarchy.edge_count(), 3);
        assert_eq!(
            hierarchy.expand(&[Role::new("OWNER")]),
            [Role::new("OWNER"), Role::SYSTEM, Role::ADMIN, Role::USER]
                .into_iter()
                .collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn role_edges_come_from_toml_only() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILENAME,
                "[roles.implies]\nAUDITOR = [\"USER\"]\n",
            )?;
            jail.set_env("ROLEGATE_ROLES__IMPLIES__OWNER", "[\"SYSTEM\"]");
            jail.set_env("ROLEGATE_ROLES", "{ implies = { ADMIN = [] } }");
            jail.set_env("ROLEGATE_TOKENS__ACCESS_TTL_SECS", "900");

            let config = ConfigLoader::new().load().map_err(|e| e.to_string())?;

            // Other sections still honour the environment.
            assert_eq!(config.tokens.access_ttl_secs, 900);

            let roles: Vec<&str> = config.roles.implies.keys().map(Role::as_str).collect();
            assert_eq!(roles, ["ADMIN", "AUDITOR", "SYSTEM"]);
            assert_eq!(
                config.roles.hierarchy().expand(&[Role::SYSTEM]),
                [Role::SYSTEM, Role::ADMIN, Role::USER]
                    .into_iter()
                    .collect::<BTreeSet<_>>()
            );
            Ok(())
        });
    }

    #[test]
    fn rejects_refresh_shorter_than_access() {
        let figment = loader().figment().merge(Toml::string(
            "[tokens]\naccess_ttl_secs = 600\nrefresh_ttl_secs = 60\n",
        ));
        assert!(matches!(extract(figment), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_bad_bind_addr() {
        let figment = loader()
            .figment()
            .merge(Toml::string("[server]\nbind_addr = \"not an address\"\n"));
        assert!(matches!(extract(figment), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn builds_key_store_with_retired_keys() {
        let keys = KeysConfig {
            private_key: Some(PRIMARY_PRIVATE.to_string()),
            public_key: Some(PRIMARY_PUBLIC.to_string()),
            retired_public_keys: vec![RetiredKeyConfig {
                public_key: SECONDARY_PUBLIC.to_string(),
                key_id: Some("rolegate-2026-09".to_string()),
            }],
            ..KeysConfig::default()
        };

        let store = keys.build_store(at()).unwrap();
        assert_eq!(store.verification_keys().count(), 2);
        assert!(store.verification_key("rolegate-2026-09").is_some());
    }

    #[test]
    fn missing_or_mismatched_keys_are_fatal() {
        assert!(matches!(
            KeysConfig::default().build_store(at()),
            Err(ConfigError::Invalid(_))
        ));

        let mismatched = KeysConfig {
            private_key: Some(PRIMARY_PRIVATE.to_string()),
            public_key: Some(SECONDARY_PUBLIC.to_string()),
            ..KeysConfig::default()
        };
        assert!(matches!(
            mismatched.build_store(at()),
            Err(ConfigError::Keys {
                source: KeyParseError::Mismatch,
                ..
            })
        ));
    }

    #[test]
    fn debug_redacts_private_key() {
        let keys = KeysConfig {
            private_key: Some(PRIMARY_PRIVATE.to_string()),
            ..KeysConfig::default()
        };
        assert!(!format!("{keys:?}").contains("PRIVATE KEY"));
    }
}
