//! Pre-flight safety checks over the parsed inputs and remote state.

use std::collections::{BTreeSet, HashSet};

use dirsync_core::config::SyncOptions;
use dirsync_core::models::action::{Action, SkipReason};
use dirsync_core::models::finding::{Finding, FindingKind, Severity};
use dirsync_core::models::user::DirectoryUser;

/// What the validation gate decided: findings for the executor to gate on,
/// the users that remain eligible for diffing (input order preserved), and
/// skip actions for the rows it excluded.
#[derive(Debug)]
pub struct ValidationOutcome {
    pub findings: Vec<Finding>,
    pub eligible: Vec<DirectoryUser>,
    pub skips: Vec<Action>,
}

/// Run all pre-flight checks. Findings come back in a fixed order
/// (duplicates, invalid emails, mass deletion, unchanged input) so repeated
/// runs produce reproducible logs.
pub fn validate(
    users: &[DirectoryUser],
    remote_active_emails: &BTreeSet<String>,
    cache_hit: bool,
    options: &SyncOptions,
) -> ValidationOutcome {
    let mut duplicate_findings = Vec::new();
    let mut email_findings = Vec::new();
    let mut eligible = Vec::new();
    let mut skips = Vec::new();
    let mut seen = HashSet::new();

    let duplicate_severity = if options.halt_on_duplicates {
        Severity::Blocking
    } else {
        Severity::Advisory
    };

    for user in users {
        let key = user.email_key();

        if !seen.insert(key.clone()) {
            duplicate_findings.push(Finding {
                kind: FindingKind::DuplicateUser,
                severity: duplicate_severity,
                detail: format!("duplicate row for {}; keeping the first occurrence", key),
            });
            skips.push(Action::SkipUser {
                email: user.email.clone(),
                reason: SkipReason::DuplicateRow,
            });
            continue;
        }

        if !is_valid_email(&key) {
            email_findings.push(Finding::advisory(
                FindingKind::InvalidEmail,
                format!("'{}' is not a valid email address", user.email.trim()),
            ));
            skips.push(Action::SkipUser {
                email: user.email.clone(),
                reason: SkipReason::InvalidEmail,
            });
            continue;
        }

        eligible.push(user.clone());
    }

    let mut findings = duplicate_findings;
    findings.append(&mut email_findings);

    let eligible_emails: HashSet<String> = eligible.iter().map(|u| u.email_key()).collect();
    let predicted_deletions = remote_active_emails
        .iter()
        .filter(|email| !eligible_emails.contains(*email))
        .count();
    let remote_count = remote_active_emails.len();
    let ratio = predicted_deletions as f64 / remote_count.max(1) as f64;
    if ratio > options.mass_deletion_threshold {
        findings.push(Finding::blocking(
            FindingKind::MassDeletion,
            format!(
                "would delete {predicted_deletions} of {remote_count} remote users \
                 ({:.1}% > {:.1}% threshold)",
                ratio * 100.0,
                options.mass_deletion_threshold * 100.0
            ),
        ));
    }

    if cache_hit {
        findings.push(Finding::blocking(
            FindingKind::UnchangedInput,
            "a report for this input digest already exists; pass force to re-run".to_string(),
        ));
    }

    ValidationOutcome {
        findings,
        eligible,
        skips,
    }
}

/// Syntactic email check: non-empty local part, one `@`, and a dot in the
/// domain. Deliverability is the remote service's problem.
fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
