use std::collections::BTreeSet;

use rolegate_core::{ApplicationName, Username};

use crate::Role;

/// An authenticated caller: who they are, which application they act in, and
/// their fully expanded roles there.
///
/// Built per request from a verified access token and discarded afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    subject: Username,
    application: ApplicationName,
    roles: BTreeSet<Role>,
}

impl Principal {
    pub fn new(subject: Username, application: ApplicationName, roles: BTreeSet<Role>) -> Self {
        Self {
            subject,
            application,
            roles,
        }
    }

    pub fn subject(&self) -> &Username {
        &self.subject
    }

    pub fn application(&self) -> &ApplicationName {
        &self.application
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    /// Exact or implied membership.
    ///
    /// Roles were expanded when the token was issued, so membership in the
    /// claim already covers implied roles.
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    pub fn has_any_role<'a>(&self, roles: impl IntoIterator<Item = &'a Role>) -> bool {
        roles.into_iter().any(|r| self.has_role(r))
    }
}
