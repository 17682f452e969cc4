//! Capability checks invoked directly by request handlers.
//!
//! Each check is a named method on [`Authorizer`]; handlers call the one they
//! need instead of evaluating policy expressions.

use serde::Serialize;
use thiserror::Error;

use rolegate_core::Username;

use crate::{Principal, Role};

/// A named thing a principal may be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability<'a> {
    /// Hold `role`, directly or through the hierarchy.
    HoldRole(&'a Role),
    /// Read or change the person record owned by `owner`.
    AccessPerson { owner: &'a Username },
    /// Administer the application the principal is acting in.
    ManageApplication,
}

impl core::fmt::Display for Capability<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Capability::HoldRole(role) => write!(f, "hold role '{role}'"),
            Capability::AccessPerson { owner } => write!(f, "access person '{owner}'"),
            Capability::ManageApplication => f.write_str("manage application"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: cannot {0}")]
    Forbidden(String),
}

pub trait Authorizer: Send + Sync {
    fn has_role(&self, principal: &Principal, role: &Role) -> bool {
        principal.has_role(role)
    }

    fn can_access_person(&self, principal: &Principal, owner: &Username) -> bool;

    fn can_manage_application(&self, principal: &Principal) -> bool;

    /// Dispatch a capability to its check.
    fn authorize(&self, principal: &Principal, capability: Capability<'_>) -> Result<(), AuthzError> {
        let allowed = match capability {
            Capability::HoldRole(role) => self.has_role(principal, role),
            Capability::AccessPerson { owner } => self.can_access_person(principal, owner),
            Capability::ManageApplication => self.can_manage_application(principal),
        };

        if allowed {
            Ok(())
        } else {
            Err(AuthzError::Forbidden(capability.to_string()))
        }
    }
}

/// Role-based policy: users reach their own records, administrators reach
/// everyone's, and only system operators manage applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleAuthorizer {
    pub admin_role: Role,
    pub system_role: Role,
}

impl Default for RoleAuthorizer {
    fn default() -> Self {
        Self {
            admin_role: Role::ADMIN,
            system_role: Role::SYSTEM,
        }
    }
}

impl Authorizer for RoleAuthorizer {
    fn can_access_person(&self, principal: &Principal, owner: &Username) -> bool {
        principal.subject() == owner || principal.has_role(&self.admin_role)
    }

    fn can_manage_application(&self, principal: &Principal) -> bool {
        principal.has_role(&self.system_role)
    }
}
