//! Roles and the role inheritance graph.
//!
//! A [`RoleHierarchy`] maps each role to the roles it directly inherits. It is built once from
//! configuration at startup, checked for cycles, and then only read. Every role that appears as a
//! key gets its full set of transitively inherited roles precomputed, so [`RoleHierarchy::satisfies`]
//! is a set lookup rather than a graph walk.
//!
//! ```
//! use std::collections::BTreeMap;
//! use fitapi::auth::roles::{Role, RoleHierarchy};
//!
//! let hierarchy = RoleHierarchy::new(BTreeMap::from([
//!     (Role::User, vec![]),
//!     (Role::Moderator, vec![Role::User]),
//!     (Role::Admin, vec![Role::User, Role::Moderator]),
//! ]))
//! .unwrap();
//!
//! assert!(hierarchy.satisfies(Role::Admin, Role::User));
//! assert!(!hierarchy.satisfies(Role::User, Role::Admin));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Authorization level assigned to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::User, Role::Moderator, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Moderator => "MODERATOR",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw inheritance edges as they appear in configuration: role -> directly inherited roles.
pub type RoleEdges = BTreeMap<Role, Vec<Role>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    /// `path` starts and ends with the same role
    #[error("role hierarchy contains a cycle: {}", format_path(.path))]
    Cycle { path: Vec<Role> },
}

fn format_path(path: &[Role]) -> String {
    path.iter().map(Role::as_str).collect::<Vec<_>>().join(" -> ")
}

/// Immutable role inheritance graph with a cached transitive closure.
#[derive(Debug, Clone)]
pub struct RoleHierarchy {
    closure: HashMap<Role, HashSet<Role>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl RoleHierarchy {
    /// Build a hierarchy, rejecting any graph in which a role inherits itself directly or
    /// transitively.
    pub fn new(edges: RoleEdges) -> Result<Self, HierarchyError> {
        let mut marks = HashMap::new();
        let mut path = Vec::new();
        for role in edges.keys() {
            detect_cycle(*role, &edges, &mut marks, &mut path)?;
        }

        let closure = edges.keys().map(|role| (*role, reachable_from(*role, &edges))).collect();

        Ok(Self { closure })
    }

    /// Whether a principal holding `current` may act with the privileges of `required`.
    ///
    /// True when the roles are equal or `required` is reachable from `current` through one or
    /// more inheritance edges. A role that is not a key in the hierarchy inherits nothing.
    pub fn satisfies(&self, current: Role, required: Role) -> bool {
        if current == required {
            return true;
        }

        match self.closure.get(&current) {
            Some(inherited) => inherited.contains(&required),
            None => false,
        }
    }
}

/// The stock platform hierarchy: admins inherit moderators and users, moderators inherit users.
pub fn default_edges() -> RoleEdges {
    BTreeMap::from([
        (Role::User, vec![]),
        (Role::Moderator, vec![Role::User]),
        (Role::Admin, vec![Role::User, Role::Moderator]),
    ])
}

impl Default for RoleHierarchy {
    fn default() -> Self {
        Self::new(default_edges()).expect("default role hierarchy is acyclic")
    }
}

fn detect_cycle(role: Role, edges: &RoleEdges, marks: &mut HashMap<Role, Mark>, path: &mut Vec<Role>) -> Result<(), HierarchyError> {
    match marks.get(&role) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|r| *r == role).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(role);
            return Err(HierarchyError::Cycle { path: cycle });
        }
        None => {}
    }

    marks.insert(role, Mark::Visiting);
    path.push(role);
    for parent in edges.get(&role).into_iter().flatten() {
        detect_cycle(*parent, edges, marks, path)?;
    }
    path.pop();
    marks.insert(role, Mark::Done);

    Ok(())
}

fn reachable_from(role: Role, edges: &RoleEdges) -> HashSet<Role> {
    let mut seen = HashSet::new();
    let mut stack: Vec<Role> = edges.get(&role).cloned().unwrap_or_default();

    while let Some(next) = stack.pop() {
        if seen.insert(next) {
            stack.extend(edges.get(&next).into_iter().flatten().copied());
        }
    }

    seen
}
