//! Three-way reconciliation between desired users, the mapping index, and
//! the observed remote snapshot.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::warn;

use dirsync_core::models::action::{Action, SkipReason};
use dirsync_core::models::mapping::{GroupMappingIndex, ResolvedGrant};
use dirsync_core::models::user::{DirectoryUser, RemoteUser};

use crate::resolver::desired_grants;

/// Compute the ordered action list for one run.
///
/// Deletions come first, from the pre-run snapshot alone, ordered by
/// ascending remote id; creations and updates follow in input row order.
/// Both orderings are arbitrary but fixed so identical inputs produce
/// byte-identical report logs. Each distinct user appears at most once.
pub fn diff(
    eligible: &[DirectoryUser],
    index: &GroupMappingIndex,
    snapshot: &[RemoteUser],
    soft_delete: bool,
    logs: &mut Vec<String>,
) -> Vec<Action> {
    // One remote record per email, first-seen wins. Remote duplicates are an
    // upstream anomaly; they are logged and never deleted automatically.
    let mut remote_by_email: HashMap<String, &RemoteUser> = HashMap::new();
    for remote in snapshot {
        let key = remote.email_key();
        if remote_by_email.contains_key(&key) {
            warn!(email = %key, id = remote.id, "duplicate remote record");
            logs.push(format!(
                "Anomaly: remote has multiple records for {key}; using the first (ignoring id {}).",
                remote.id
            ));
        } else {
            remote_by_email.insert(key, remote);
        }
    }

    let eligible_emails: HashSet<String> = eligible.iter().map(|u| u.email_key()).collect();

    let mut actions = Vec::new();

    // Deletions from the pre-run snapshot, never interleaved with creates,
    // so a record deleted this run can never also be "kept".
    let mut deletions: Vec<&RemoteUser> = remote_by_email
        .values()
        .filter(|r| r.active && !eligible_emails.contains(&r.email_key()))
        .copied()
        .collect();
    deletions.sort_by_key(|r| r.id);
    for remote in deletions {
        actions.push(Action::DeleteUser {
            remote_id: remote.id,
            email: remote.email.clone(),
            soft: soft_delete,
        });
    }

    for user in eligible {
        if !index.contains_key(&user.group) {
            logs.push(format!(
                "No mapping entry for group '{}' (user {}); granting no roles.",
                user.group, user.email
            ));
        }
        let desired = desired_grants(index, &user.group);

        let Some(remote) = remote_by_email.get(&user.email_key()) else {
            actions.push(Action::CreateUser {
                user: user.clone(),
                grants: desired,
            });
            continue;
        };

        let current: BTreeSet<ResolvedGrant> = remote
            .grants
            .iter()
            .map(|g| ResolvedGrant::new(g.scope.clone(), g.role.clone()))
            .collect();

        let added: BTreeSet<ResolvedGrant> = desired.difference(&current).cloned().collect();
        let mut removed: Vec<_> = remote
            .grants
            .iter()
            .filter(|g| !desired.contains(&ResolvedGrant::new(g.scope.clone(), g.role.clone())))
            .cloned()
            .collect();
        removed.sort_by_key(|g| g.id);

        let reactivate = !remote.active;
        if added.is_empty() && removed.is_empty() && !reactivate {
            actions.push(Action::SkipUser {
                email: user.email.clone(),
                reason: SkipReason::NoChange,
            });
        } else {
            actions.push(Action::UpdateRoles {
                remote_id: remote.id,
                email: user.email.clone(),
                added,
                removed,
                reactivate,
            });
        }
    }

    actions
}
