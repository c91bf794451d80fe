//! Mode-aware executor: applies or simulates the planned action list.

use tracing::{error, info, warn};

use dirsync_core::error::Result;
use dirsync_core::models::action::Action;
use dirsync_core::models::finding::Finding;

use crate::client::{DirectoryApi, UserStatus};
use crate::names::split_display_name;

/// How a run treats mutations and blocking findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Log what would happen; never call the remote service, never halt.
    Simulate,
    /// Halt on blocking findings before the first mutation; otherwise apply
    /// with per-action failure isolation.
    Normal,
    /// Demote blocking findings to warnings and apply as in Normal.
    Force,
}

impl SyncMode {
    pub fn from_flags(dry_run: bool, force: bool) -> Self {
        if dry_run {
            SyncMode::Simulate
        } else if force {
            SyncMode::Force
        } else {
            SyncMode::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncMode::Simulate => "dry-run",
            SyncMode::Normal => "normal",
            SyncMode::Force => "force",
        }
    }
}

/// Mutation counters for one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActionCounts {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub skipped: u64,
}

/// Result of running the executor.
#[derive(Debug)]
pub struct Outcome {
    pub counts: ActionCounts,
    /// Set when Normal mode halted on blocking findings; no action was
    /// applied in that case.
    pub halted: bool,
}

/// Gate on the findings, then apply (or simulate) every action in order.
///
/// A failed remote call is fatal to that one user's outcome and never to the
/// batch: it is logged, counted as skipped, and the loop continues.
pub async fn execute<C: DirectoryApi + ?Sized>(
    client: &C,
    mode: SyncMode,
    actions: &[Action],
    findings: &[Finding],
    logs: &mut Vec<String>,
) -> Outcome {
    let mut blocked = false;
    for finding in findings {
        match (mode, finding.is_blocking()) {
            (SyncMode::Simulate, true) => {
                logs.push(format!("[DRY RUN] {finding} (would block a normal run)"));
            }
            (SyncMode::Normal, true) => {
                logs.push(format!("Blocking finding: {finding}"));
                blocked = true;
            }
            (SyncMode::Force, true) => {
                warn!(finding = %finding, "blocking finding demoted by force mode");
                logs.push(format!("Warning (forced past blocking finding): {finding}"));
            }
            (_, false) => {
                logs.push(format!("Advisory: {finding}"));
            }
        }
    }

    if blocked {
        logs.push("Halting before any changes are applied.".to_string());
        return Outcome {
            counts: ActionCounts::default(),
            halted: true,
        };
    }

    let mut counts = ActionCounts::default();
    for action in actions {
        if mode == SyncMode::Simulate {
            simulate_action(action, &mut counts, logs);
            continue;
        }

        match apply_action(client, action, logs).await {
            Ok(applied) => {
                counts.created += applied.created;
                counts.updated += applied.updated;
                counts.deleted += applied.deleted;
                counts.skipped += applied.skipped;
            }
            Err(e) => {
                error!(email = action.email(), error = %e, "action failed");
                logs.push(format!("Error processing {}: {e}; skipping.", action.email()));
                counts.skipped += 1;
            }
        }
    }

    Outcome {
        counts,
        halted: false,
    }
}

fn simulate_action(action: &Action, counts: &mut ActionCounts, logs: &mut Vec<String>) {
    match action {
        Action::CreateUser { user, grants } => {
            logs.push(format!(
                "[DRY RUN] Would create user {} with {} grant(s).",
                user.email,
                grants.len()
            ));
            counts.created += 1;
        }
        Action::UpdateRoles {
            email,
            added,
            removed,
            reactivate,
            ..
        } => {
            let mut detail = format!("+{} grant(s), -{} grant(s)", added.len(), removed.len());
            if *reactivate {
                detail.push_str(", reactivate");
            }
            logs.push(format!("[DRY RUN] Would update user {email} ({detail})."));
            counts.updated += 1;
        }
        Action::DeleteUser { email, soft, .. } => {
            let verb = if *soft { "mark inactive" } else { "delete" };
            logs.push(format!(
                "[DRY RUN] Would {verb} user {email} (not in directory file)."
            ));
            counts.deleted += 1;
        }
        Action::SkipUser { email, reason } => {
            logs.push(format!("[DRY RUN] Would skip user {email} ({reason})."));
            counts.skipped += 1;
        }
    }
}

async fn apply_action<C: DirectoryApi + ?Sized>(
    client: &C,
    action: &Action,
    logs: &mut Vec<String>,
) -> Result<ActionCounts> {
    let mut counts = ActionCounts::default();
    match action {
        Action::CreateUser { user, grants } => {
            let (first, last) = split_display_name(&user.name, &user.email);
            let created = client.create_user(&user.email, &first, &last).await?;
            info!(email = %user.email, id = created.id, "created remote user");
            logs.push(format!(
                "User {} created with ID {}.",
                user.email, created.id
            ));

            // The account exists at this point, so a failed grant does not
            // undo the create; it is logged and the rest still apply.
            for grant in grants {
                match client
                    .create_grant(created.id, &grant.role, &grant.scope)
                    .await
                {
                    Ok(()) => logs.push(format!("Granted {grant} to {}.", user.email)),
                    Err(e) => {
                        error!(email = %user.email, grant = %grant, error = %e, "grant failed");
                        logs.push(format!("Error granting {grant} to {}: {e}", user.email));
                    }
                }
            }
            counts.created += 1;
        }
        Action::UpdateRoles {
            remote_id,
            email,
            added,
            removed,
            reactivate,
        } => {
            if *reactivate {
                client.set_user_status(*remote_id, UserStatus::Active).await?;
                logs.push(format!("Reactivated user {email}."));
            }
            for grant in removed {
                client.delete_grant(grant.id).await?;
                logs.push(format!("Revoked {}:{} from {email}.", grant.scope, grant.role));
            }
            for grant in added {
                client.create_grant(*remote_id, &grant.role, &grant.scope).await?;
                logs.push(format!("Granted {grant} to {email}."));
            }
            info!(
                email = %email,
                added = added.len(),
                removed = removed.len(),
                "updated roles"
            );
            counts.updated += 1;
        }
        Action::DeleteUser {
            remote_id,
            email,
            soft,
        } => {
            if *soft {
                client
                    .set_user_status(*remote_id, UserStatus::Inactive)
                    .await?;
                logs.push(format!(
                    "User {email} not found in directory file. Marked as inactive."
                ));
            } else {
                client.delete_user(*remote_id).await?;
                logs.push(format!(
                    "User {email} not found in directory file. Deleted."
                ));
            }
            counts.deleted += 1;
        }
        Action::SkipUser { email, reason } => {
            logs.push(format!("Skipped user {email} ({reason})."));
            counts.skipped += 1;
        }
    }
    Ok(counts)
}
