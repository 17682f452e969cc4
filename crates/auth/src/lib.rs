//! `rolegate-auth`: token issuance, verification and role resolution.
//!
//! This crate is intentionally decoupled from HTTP and storage: user and role
//! data come in through the [`ApplicationRoleDirectory`] and
//! [`UserCredentialVerifier`] contracts.

pub mod authorize;
pub mod claims;
pub mod directory;
pub mod gateway;
pub mod hierarchy;
pub mod jwks;
pub mod keys;
pub mod principal;
pub mod roles;
pub mod token;

pub use authorize::{Authorizer, AuthzError, Capability, RoleAuthorizer};
pub use claims::{Claims, TokenValidationError, validate_claims};
pub use directory::{ApplicationRoleDirectory, DirectoryError, UserCredentialVerifier};
pub use gateway::{AuthorizationGateway, BasicCredentials, DirectoryRoleResolver, GatewayError};
pub use hierarchy::RoleHierarchy;
pub use jwks::{JWKS_CACHE_CONTROL, Jwk, JwkSet, JwksPublisher};
pub use keys::{KeyId, KeyIdScheme, KeyParseError, KeyStore, load_private_key, load_public_key};
pub use principal::Principal;
pub use roles::Role;
pub use token::{
    RefreshGrant, RoleResolver, TokenConfig, TokenError, TokenPair, TokenRejection, TokenService,
};
