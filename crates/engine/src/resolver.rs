//! Role mapping resolution: group name → (scope, role) pairs.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use tracing::debug;

use dirsync_core::models::mapping::{
    GroupMapping, GroupMappingIndex, MappingRow, ResolvedGrant, KNOWN_ROLES, WILDCARD_SCOPE,
};

/// Build the group → mapping index from raw mapping rows.
///
/// A scope exactly equal to the wildcard marker expands to
/// `organization={organization_id}`; every other scope identifier is
/// caller-opaque and passes through unchanged. Duplicate group names
/// resolve last-write-wins. Role names outside the known vocabulary pass
/// through but are flagged in the run log.
pub fn resolve(
    rows: &[MappingRow],
    organization_id: i64,
    logs: &mut Vec<String>,
) -> GroupMappingIndex {
    let mut index = GroupMappingIndex::new();

    for row in rows {
        let scopes: Vec<String> = row
            .scopes
            .iter()
            .map(|scope| {
                if scope == WILDCARD_SCOPE {
                    let expanded = format!("organization={organization_id}");
                    debug!(group = %row.group, scope = %expanded, "expanded wildcard scope");
                    logs.push(format!(
                        "Resolved wildcard scope for group '{}' to {expanded}.",
                        row.group
                    ));
                    expanded
                } else {
                    scope.clone()
                }
            })
            .collect();

        for role in &row.roles {
            if !KNOWN_ROLES.contains(&role.as_str()) {
                logs.push(format!(
                    "Warning: group '{}' names unknown role '{role}'; passing it through.",
                    row.group
                ));
            }
        }

        if index.contains_key(&row.group) {
            logs.push(format!(
                "Duplicate mapping entry for group '{}'; keeping the last one.",
                row.group
            ));
        }
        index.insert(
            row.group.clone(),
            GroupMapping {
                scopes,
                roles: row.roles.clone(),
            },
        );
    }

    index
}

/// Desired grant set for one group: every role applied to every scope.
/// An unmapped group yields the empty set.
pub fn desired_grants(index: &GroupMappingIndex, group: &str) -> BTreeSet<ResolvedGrant> {
    let mut grants = BTreeSet::new();
    if let Some(mapping) = index.get(group) {
        for scope in &mapping.scopes {
            for role in &mapping.roles {
                grants.insert(ResolvedGrant::new(scope.clone(), role.clone()));
            }
        }
    }
    grants
}

/// Loaded mapping state shared across runs.
#[derive(Clone)]
pub struct LoadedMapping {
    pub bytes: Arc<Vec<u8>>,
    pub index: Arc<GroupMappingIndex>,
}

/// Service-owned mapping cache with an explicit reload operation.
///
/// Storage-backed runs reuse the last loaded mapping dataset instead of
/// refetching it per request; `reload` swaps it atomically. This is explicit
/// injected state, never module-level mutable state.
#[derive(Default)]
pub struct MappingCache {
    inner: RwLock<Option<LoadedMapping>>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached mapping with freshly fetched bytes.
    pub fn reload(&self, bytes: Vec<u8>, index: GroupMappingIndex) {
        let loaded = LoadedMapping {
            bytes: Arc::new(bytes),
            index: Arc::new(index),
        };
        *self.inner.write().expect("mapping cache lock poisoned") = Some(loaded);
    }

    pub fn get(&self) -> Option<LoadedMapping> {
        self.inner
            .read()
            .expect("mapping cache lock poisoned")
            .clone()
    }
}
