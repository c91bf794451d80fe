//! Mutations the diff engine plans against the remote service.

use std::collections::BTreeSet;

use super::mapping::ResolvedGrant;
use super::user::{DirectoryUser, RemoteGrant};

/// Why a user was skipped instead of mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoChange,
    DuplicateRow,
    InvalidEmail,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::NoChange => "no-change",
            SkipReason::DuplicateRow => "duplicate-row",
            SkipReason::InvalidEmail => "invalid-email",
        };
        f.write_str(s)
    }
}

/// One planned mutation. Immutable once created; the executor consumes the
/// ordered sequence and applies or simulates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Provision a new remote user and grant the resolved set.
    CreateUser {
        user: DirectoryUser,
        grants: BTreeSet<ResolvedGrant>,
    },
    /// Reconcile an existing remote user's grants. `removed` carries remote
    /// grant ids so revocation does not need another lookup. `reactivate`
    /// is set when the remote record was inactive.
    UpdateRoles {
        remote_id: i64,
        email: String,
        added: BTreeSet<ResolvedGrant>,
        removed: Vec<RemoteGrant>,
        reactivate: bool,
    },
    /// Remove a remote user absent from the desired set. `soft` deactivates
    /// instead of deleting.
    DeleteUser {
        remote_id: i64,
        email: String,
        soft: bool,
    },
    /// Record a user that needs no mutation this run.
    SkipUser { email: String, reason: SkipReason },
}

impl Action {
    /// Email of the user this action touches.
    pub fn email(&self) -> &str {
        match self {
            Action::CreateUser { user, .. } => &user.email,
            Action::UpdateRoles { email, .. } => email,
            Action::DeleteUser { email, .. } => email,
            Action::SkipUser { email, .. } => email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_reason_display() {
        assert_eq!(SkipReason::NoChange.to_string(), "no-change");
        assert_eq!(SkipReason::DuplicateRow.to_string(), "duplicate-row");
        assert_eq!(SkipReason::InvalidEmail.to_string(), "invalid-email");
    }

    #[test]
    fn action_email_accessor() {
        let action = Action::DeleteUser {
            remote_id: 9,
            email: "gone@example.com".to_string(),
            soft: true,
        };
        assert_eq!(action.email(), "gone@example.com");

        let action = Action::SkipUser {
            email: "same@example.com".to_string(),
            reason: SkipReason::NoChange,
        };
        assert_eq!(action.email(), "same@example.com");
    }
}
