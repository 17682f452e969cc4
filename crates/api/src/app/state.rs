use std::sync::Arc;

use chrono::{DateTime, Utc};

use rolegate_auth::{
    ApplicationRoleDirectory, AuthorizationGateway, Authorizer, JwksPublisher, KeyStore,
    RoleAuthorizer, RoleHierarchy, TokenConfig, TokenService, UserCredentialVerifier,
};
use rolegate_infra::{DirectorySeed, InMemoryDirectory};

use crate::config::AppConfig;

/// Services shared by every request. Immutable once built.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<AuthorizationGateway>,
    pub jwks: Arc<JwksPublisher>,
    pub authorizer: Arc<dyn Authorizer>,
}

impl AppState {
    pub fn new(
        keys: KeyStore,
        tokens: TokenConfig,
        credentials: Arc<dyn UserCredentialVerifier>,
        directory: Arc<dyn ApplicationRoleDirectory>,
        hierarchy: RoleHierarchy,
    ) -> Self {
        let jwks = Arc::new(JwksPublisher::new(&keys));
        let tokens = Arc::new(TokenService::new(Arc::new(keys), tokens));
        let gateway = Arc::new(AuthorizationGateway::new(
            tokens,
            credentials,
            directory,
            Arc::new(hierarchy),
        ));

        Self {
            gateway,
            jwks,
            authorizer: Arc::new(RoleAuthorizer::default()),
        }
    }

    /// One in-memory directory serving both credentials and roles.
    pub fn with_directory(
        keys: KeyStore,
        tokens: TokenConfig,
        directory: Arc<InMemoryDirectory>,
        hierarchy: RoleHierarchy,
    ) -> Self {
        Self::new(keys, tokens, directory.clone(), directory, hierarchy)
    }

    /// Load keys, hierarchy and directory from configuration.
    pub fn from_config(config: &AppConfig, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let keys = config.keys.build_store(now)?;

        let hierarchy = config.roles.hierarchy();
        if let Some(cycle) = hierarchy.find_cycle() {
            let cycle: Vec<&str> = cycle.iter().map(|r| r.as_str()).collect();
            tracing::warn!(?cycle, "role hierarchy contains a cycle");
        }

        let directory = match &config.directory.seed_file {
            Some(path) => DirectorySeed::from_file(path)?.into_directory()?,
            None => {
                tracing::warn!("no directory seed configured; the directory is empty");
                InMemoryDirectory::new()
            }
        };

        Ok(Self::with_directory(
            keys,
            config.tokens.clone(),
            Arc::new(directory),
            hierarchy,
        ))
    }

    pub fn tokens(&self) -> &TokenService {
        self.gateway.tokens()
    }
}
