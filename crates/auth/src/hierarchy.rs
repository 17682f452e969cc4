//! Role implication graph and its reachability expansion.
//!
//! An edge `R -> S` means "holding R also grants S". Expansion happens once,
//! at token issuance; request-time checks only test set membership.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::Role;

/// Directed role implication graph.
///
/// Immutable after construction and shared read-only between requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleHierarchy {
    edges: BTreeMap<Role, BTreeSet<Role>>,
}

impl RoleHierarchy {
    /// Graph with no edges: every role expands to itself only.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `SYSTEM -> ADMIN -> USER`.
    pub fn standard() -> Self {
        Self::builder()
            .imply(Role::SYSTEM, Role::ADMIN)
            .imply(Role::ADMIN, Role::USER)
            .build()
    }

    pub fn builder() -> RoleHierarchyBuilder {
        RoleHierarchyBuilder::default()
    }

    /// Build from an adjacency map (`role -> directly implied roles`).
    pub fn from_edges<I, J>(edges: I) -> Self
    where
        I: IntoIterator<Item = (Role, J)>,
        J: IntoIterator<Item = Role>,
    {
        let mut builder = Self::builder();
        for (from, implied) in edges {
            for to in implied {
                builder = builder.imply(from.clone(), to);
            }
        }
        builder.build()
    }

    /// Roles directly implied by `role` (no transitive closure).
    pub fn implied_by(&self, role: &Role) -> impl Iterator<Item = &Role> {
        self.edges.get(role).into_iter().flatten()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Expand a set of granted roles into every role reachable from it.
    ///
    /// Breadth-first over the implicit graph; the reachable set doubles as the
    /// visited set, so cycles terminate. The result always contains the input.
    pub fn expand<'a, I>(&self, roles: I) -> BTreeSet<Role>
    where
        I: IntoIterator<Item = &'a Role>,
    {
        let mut reachable: BTreeSet<Role> = BTreeSet::new();
        let mut queue: VecDeque<Role> = VecDeque::new();

        for role in roles {
            if reachable.insert(role.clone()) {
                queue.push_back(role.clone());
            }
        }

        while let Some(role) = queue.pop_front() {
            for implied in self.implied_by(&role) {
                if reachable.insert(implied.clone()) {
                    queue.push_back(implied.clone());
                }
            }
        }

        reachable
    }

    /// Find one implication cycle, if any, as the sequence of roles on it.
    ///
    /// Cycles do not break [`RoleHierarchy::expand`], but they are a modeling
    /// error worth surfacing at startup.
    pub fn find_cycle(&self) -> Option<Vec<Role>> {
        let mut done: HashSet<&Role> = HashSet::new();

        for start in self.edges.keys() {
            if done.contains(start) {
                continue;
            }
            let mut path: Vec<&Role> = Vec::new();
            if let Some(cycle) = self.visit(start, &mut path, &mut done) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        role: &'a Role,
        path: &mut Vec<&'a Role>,
        done: &mut HashSet<&'a Role>,
    ) -> Option<Vec<Role>> {
        if let Some(pos) = path.iter().position(|r| *r == role) {
            return Some(path[pos..].iter().map(|r| (*r).clone()).collect());
        }
        if done.contains(role) {
            return None;
        }

        path.push(role);
        for next in self.implied_by(role) {
            if let Some(cycle) = self.visit(next, path, done) {
                return Some(cycle);
            }
        }
        path.pop();
        done.insert(role);
        None
    }
}

#[derive(Debug, Default)]
pub struct RoleHierarchyBuilder {
    edges: BTreeMap<Role, BTreeSet<Role>>,
}

impl RoleHierarchyBuilder {
    /// Add the edge `from -> to`.
    pub fn imply(mut self, from: impl Into<Role>, to: impl Into<Role>) -> Self {
        self.edges.entry(from.into()).or_default().insert(to.into());
        self
    }

    pub fn build(self) -> RoleHierarchy {
        RoleHierarchy { edges: self.edges }
    }
}
