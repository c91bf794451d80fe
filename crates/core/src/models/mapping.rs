//! Group-to-role mapping model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The wildcard scope marker meaning "organization-wide".
pub const WILDCARD_SCOPE: &str = "*";

/// Role names the remote authorization service is known to accept. Values
/// outside this list are passed through but flagged in the run log.
pub const KNOWN_ROLES: &[&str] = &["developer", "member", "ops", "secops", "admin"];

/// One raw row of the mapping dataset. `scopes` and `roles` are the source
/// comma-separated strings, split and trimmed by the CSV reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRow {
    pub group: String,
    pub scopes: Vec<String>,
    pub roles: Vec<String>,
}

/// A group's resolved authorization: every role in `roles` applies to every
/// scope in `scopes`. Scopes are fully resolved (no wildcard marker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMapping {
    pub scopes: Vec<String>,
    pub roles: Vec<String>,
}

/// Index from group name to its resolved mapping. A group with no entry
/// yields zero granted scopes for its members.
pub type GroupMappingIndex = HashMap<String, GroupMapping>;

/// The atomic unit of authorization: a (scope, role) pair a user should
/// hold. `Ord` so desired grant sets order deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResolvedGrant {
    pub scope: String,
    pub role: String,
}

impl ResolvedGrant {
    pub fn new(scope: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            role: role.into(),
        }
    }
}

impl std::fmt::Display for ResolvedGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scope, self.role)
    }
}
