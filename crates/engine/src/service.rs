//! End-to-end orchestration of one sync run.

use std::collections::BTreeSet;

use tracing::{info, warn};

use dirsync_core::config::SyncOptions;
use dirsync_core::csv;
use dirsync_core::error::Result;
use dirsync_core::models::report::{RunReport, RunStatus};
use dirsync_core::models::user::RemoteUser;

use crate::cache::{compute_digest, ResultCache};
use crate::client::DirectoryApi;
use crate::diff::diff;
use crate::executor::{execute, SyncMode};
use crate::resolver::resolve;
use crate::store::ObjectStore;
use crate::validate::validate;

/// Runs the full reconciliation pipeline: digest, cache, parse, resolve,
/// snapshot, validate, diff, execute, persist. One invocation owns all of
/// its state; callers wanting at-most-one-concurrent-run-per-digest must
/// hold their own lock around this call.
pub struct SyncService<C: DirectoryApi, S: ObjectStore> {
    client: C,
    cache: ResultCache<S>,
    options: SyncOptions,
    organization_id: i64,
}

impl<C: DirectoryApi, S: ObjectStore> SyncService<C, S> {
    pub fn new(
        client: C,
        cache: ResultCache<S>,
        options: SyncOptions,
        organization_id: i64,
    ) -> Self {
        Self {
            client,
            cache,
            options,
            organization_id,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Execute one run over the raw input payloads.
    pub async fn execute_sync(
        &self,
        users_bytes: &[u8],
        mapping_bytes: &[u8],
        dry_run: bool,
        force: bool,
    ) -> Result<RunReport> {
        let mode = SyncMode::from_flags(dry_run, force);
        let digest = compute_digest(users_bytes, mapping_bytes);
        info!(mode = mode.label(), digest = %digest, "starting sync run");

        // A lookup failure must not mask a runnable sync; treat it as a miss.
        let cached = if force {
            None
        } else {
            match self.cache.lookup(&digest).await {
                Ok(cached) => cached,
                Err(e) => {
                    warn!(error = %e, "cache lookup failed; proceeding as a miss");
                    None
                }
            }
        };

        // Unchanged input short-circuits a normal run to the stored report.
        // Simulate still walks the whole pipeline, with the blocking finding
        // downgraded to a log line.
        let cache_hit = cached.is_some();
        if mode == SyncMode::Normal {
            if let Some(previous) = cached {
                info!(digest = %digest, "inputs unchanged; serving cached report");
                return Ok(previous.as_cached());
            }
        }

        let mut logs = vec![format!(
            "Starting synchronization in {} mode.",
            mode.label()
        )];
        if mode == SyncMode::Simulate {
            logs.push("DRY RUN MODE: no changes will be made to users or roles.".to_string());
        }

        let users = csv::read_users(users_bytes, &self.options.users_columns)?;
        let mapping_rows = csv::read_mappings(mapping_bytes, &self.options.mapping_columns)?;
        logs.push(format!(
            "Parsed {} directory users and {} group mappings.",
            users.len(),
            mapping_rows.len()
        ));

        let index = resolve(&mapping_rows, self.organization_id, &mut logs);

        let snapshot = self.fetch_snapshot().await?;
        logs.push(format!("Fetched {} remote users.", snapshot.len()));

        let remote_active_emails: BTreeSet<String> = snapshot
            .iter()
            .filter(|r| r.active)
            .map(|r| r.email_key())
            .collect();

        let validation = validate(&users, &remote_active_emails, cache_hit, &self.options);
        let users_processed = validation.eligible.len() as u64;

        let mut actions = diff(
            &validation.eligible,
            &index,
            &snapshot,
            !self.options.hard_delete,
            &mut logs,
        );
        actions.extend(validation.skips);

        let outcome = execute(
            &self.client,
            mode,
            &actions,
            &validation.findings,
            &mut logs,
        )
        .await;

        if outcome.halted {
            return Ok(RunReport::error(digest, logs));
        }

        logs.push("Synchronization completed.".to_string());
        let mut report = RunReport {
            status: RunStatus::Success,
            users_processed,
            users_created: outcome.counts.created,
            users_updated: outcome.counts.updated,
            users_deleted: outcome.counts.deleted,
            users_skipped: outcome.counts.skipped,
            logs,
            input_digest: digest.clone(),
        };

        // Simulations never persist: a stored dry-run report would satisfy
        // later cache lookups and suppress the real run.
        if mode != SyncMode::Simulate {
            if let Err(e) = self.cache.store(&digest, &report).await {
                warn!(error = %e, "failed to persist run report");
                report
                    .logs
                    .push(format!("Warning: run report could not be persisted: {e}"));
            }
        }

        Ok(report)
    }

    /// Observe the pre-run remote state: every user plus their grants.
    async fn fetch_snapshot(&self) -> Result<Vec<RemoteUser>> {
        let api_users = self.client.list_all_users().await?;
        let mut snapshot = Vec::with_capacity(api_users.len());
        for user in api_users {
            let grants = self.client.user_grants(user.id).await?;
            snapshot.push(RemoteUser {
                id: user.id,
                active: user.is_active(),
                email: user.email,
                grants,
            });
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use dirsync_core::error::DirsyncError;
    use dirsync_core::models::user::RemoteGrant;

    use crate::client::{ApiUser, UserStatus};

    use super::*;

    /// In-memory remote service: a user table plus a grant table, mutated
    /// the way the real service would be.
    #[derive(Default)]
    struct FakeRemote {
        users: Mutex<Vec<(i64, String, String)>>, // (id, email, status)
        grants: Mutex<Vec<(i64, i64, String, String)>>, // (grant id, user id, scope, role)
        next_id: AtomicI64,
        mutations: Mutex<Vec<String>>,
    }

    impl FakeRemote {
        fn with_users(users: &[(i64, &str, &str)]) -> Self {
            let remote = FakeRemote {
                next_id: AtomicI64::new(1000),
                ..FakeRemote::default()
            };
            *remote.users.lock().unwrap() = users
                .iter()
                .map(|(id, email, status)| (*id, email.to_string(), status.to_string()))
                .collect();
            remote
        }

        fn grant(&self, grant_id: i64, user_id: i64, scope: &str, role: &str) {
            self.grants.lock().unwrap().push((
                grant_id,
                user_id,
                scope.to_string(),
                role.to_string(),
            ));
        }

        fn mutations(&self) -> Vec<String> {
            self.mutations.lock().unwrap().clone()
        }

        fn status_of(&self, user_id: i64) -> String {
            self.users
                .lock()
                .unwrap()
                .iter()
                .find(|(id, _, _)| *id == user_id)
                .map(|(_, _, status)| status.clone())
                .unwrap()
        }
    }

    #[async_trait]
    impl DirectoryApi for Arc<FakeRemote> {
        async fn list_all_users(&self) -> Result<Vec<ApiUser>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .map(|(id, email, status)| ApiUser {
                    id: *id,
                    email: email.clone(),
                    status: status.clone(),
                    first_name: String::new(),
                    last_name: String::new(),
                })
                .collect())
        }

        async fn user_grants(&self, user_id: i64) -> Result<Vec<RemoteGrant>> {
            Ok(self
                .grants
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, uid, _, _)| *uid == user_id)
                .map(|(gid, _, scope, role)| RemoteGrant {
                    id: *gid,
                    scope: scope.clone(),
                    role: role.clone(),
                })
                .collect())
        }

        async fn create_user(
            &self,
            email: &str,
            _first_name: &str,
            _last_name: &str,
        ) -> Result<ApiUser> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.users
                .lock()
                .unwrap()
                .push((id, email.to_string(), "active".to_string()));
            self.mutations.lock().unwrap().push(format!("create {email}"));
            Ok(ApiUser {
                id,
                email: email.to_string(),
                status: "active".to_string(),
                first_name: String::new(),
                last_name: String::new(),
            })
        }

        async fn set_user_status(&self, user_id: i64, status: UserStatus) -> Result<()> {
            for entry in self.users.lock().unwrap().iter_mut() {
                if entry.0 == user_id {
                    entry.2 = status.as_str().to_string();
                }
            }
            self.mutations
                .lock()
                .unwrap()
                .push(format!("status {user_id} {}", status.as_str()));
            Ok(())
        }

        async fn delete_user(&self, user_id: i64) -> Result<()> {
            self.users.lock().unwrap().retain(|(id, _, _)| *id != user_id);
            self.mutations
                .lock()
                .unwrap()
                .push(format!("delete {user_id}"));
            Ok(())
        }

        async fn create_grant(&self, user_id: i64, role: &str, scope: &str) -> Result<()> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.grants
                .lock()
                .unwrap()
                .push((id, user_id, scope.to_string(), role.to_string()));
            self.mutations
                .lock()
                .unwrap()
                .push(format!("grant {user_id} {scope}:{role}"));
            Ok(())
        }

        async fn delete_grant(&self, grant_id: i64) -> Result<()> {
            self.grants.lock().unwrap().retain(|(id, ..)| *id != grant_id);
            self.mutations
                .lock()
                .unwrap()
                .push(format!("revoke {grant_id}"));
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    struct MemoryStore {
        objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.objects.lock().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), bytes.to_vec());
            Ok(())
        }
    }

    /// Store whose writes always fail, for cache-error isolation tests.
    struct BrokenStore;

    #[async_trait]
    impl ObjectStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(DirsyncError::Storage("bucket unreachable".into()))
        }

        async fn put(&self, _key: &str, _bytes: &[u8]) -> Result<()> {
            Err(DirsyncError::Storage("bucket unreachable".into()))
        }
    }

    fn service<S: ObjectStore>(
        remote: Arc<FakeRemote>,
        store: S,
    ) -> SyncService<Arc<FakeRemote>, S> {
        service_with_options(remote, store, SyncOptions::default())
    }

    fn service_with_options<S: ObjectStore>(
        remote: Arc<FakeRemote>,
        store: S,
        options: SyncOptions,
    ) -> SyncService<Arc<FakeRemote>, S> {
        SyncService::new(remote, ResultCache::new(store, "results/"), options, 1850605908)
    }

    /// Tolerates large deletion ratios; small fixtures trip the default
    /// 20% threshold with a single departed user.
    fn permissive_options() -> SyncOptions {
        SyncOptions {
            mass_deletion_threshold: 0.75,
            ..SyncOptions::default()
        }
    }

    const USERS_CSV: &[u8] =
        b"name,email,group\nJane Doe,jane@example.com,eng\nBob Ops,bob@example.com,ops\n";
    const MAPPING_CSV: &[u8] = b"group,scope,roles\neng,ns1,\"developer, admin\"\nops,*,ops\n";

    #[tokio::test]
    async fn full_run_creates_updates_and_deletes() {
        let remote = Arc::new(FakeRemote::with_users(&[
            (1, "jane@example.com", "active"),
            (2, "departed@example.com", "active"),
        ]));
        remote.grant(11, 1, "ns1", "developer");
        remote.grant(12, 1, "ns1", "viewer");

        let svc = service_with_options(remote.clone(), MemoryStore::default(), permissive_options());
        let report = svc
            .execute_sync(USERS_CSV, MAPPING_CSV, false, false)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.users_processed, 2);
        assert_eq!(report.users_created, 1); // bob
        assert_eq!(report.users_updated, 1); // jane: +admin, -viewer
        assert_eq!(report.users_deleted, 1); // departed
        assert_eq!(report.users_skipped, 0);

        let mutations = remote.mutations();
        // Deletion applies before the create, from the pre-run snapshot.
        assert_eq!(mutations[0], "status 2 inactive");
        assert!(mutations.contains(&"create bob@example.com".to_string()));
        assert!(mutations.contains(&"revoke 12".to_string()));
        assert!(mutations
            .iter()
            .any(|m| m.starts_with("grant 1 ns1:admin")));
        // Wildcard expanded for bob's ops group.
        assert!(mutations
            .iter()
            .any(|m| m.contains("organization=1850605908:ops")));
    }

    #[tokio::test]
    async fn second_identical_run_is_served_from_cache() {
        let remote = Arc::new(FakeRemote::with_users(&[]));
        let store = MemoryStore::default();
        let svc = service(remote.clone(), store.clone());

        let first = svc
            .execute_sync(USERS_CSV, MAPPING_CSV, false, false)
            .await
            .unwrap();
        assert_eq!(first.status, RunStatus::Success);
        let mutations_after_first = remote.mutations().len();

        let second = svc
            .execute_sync(USERS_CSV, MAPPING_CSV, false, false)
            .await
            .unwrap();
        assert_eq!(second.status, RunStatus::Cached);
        assert_eq!(second.users_created, first.users_created);
        assert_eq!(second.logs, first.logs);
        assert_eq!(second.input_digest, first.input_digest);
        // The cached serve touched the remote not at all.
        assert_eq!(remote.mutations().len(), mutations_after_first);
    }

    #[tokio::test]
    async fn changed_input_bypasses_cache() {
        let remote = Arc::new(FakeRemote::with_users(&[]));
        let store = MemoryStore::default();
        let svc = service(remote, store.clone());

        let first = svc
            .execute_sync(USERS_CSV, MAPPING_CSV, false, false)
            .await
            .unwrap();

        let edited = b"name,email,group\nJane Doe,jane@example.com,eng\n";
        let second = svc
            .execute_sync(edited, MAPPING_CSV, false, false)
            .await
            .unwrap();

        assert_eq!(second.status, RunStatus::Success);
        assert_ne!(second.input_digest, first.input_digest);
    }

    #[tokio::test]
    async fn force_rerun_bypasses_lookup_but_stores() {
        let remote = Arc::new(FakeRemote::with_users(&[]));
        let store = MemoryStore::default();
        let svc = service(remote.clone(), store.clone());

        svc.execute_sync(USERS_CSV, MAPPING_CSV, false, false)
            .await
            .unwrap();
        let forced = svc
            .execute_sync(USERS_CSV, MAPPING_CSV, false, true)
            .await
            .unwrap();

        // Not served from cache: the run re-executed (users already exist
        // remotely now, so it reports no-change skips, not creates).
        assert_eq!(forced.status, RunStatus::Success);
        assert_eq!(forced.users_created, 0);
        assert_eq!(forced.users_skipped, 2);
    }

    #[tokio::test]
    async fn dry_run_matches_normal_counts_without_mutating() {
        let make_remote = || {
            let remote = Arc::new(FakeRemote::with_users(&[
                (1, "jane@example.com", "active"),
                (2, "departed@example.com", "active"),
            ]));
            remote.grant(11, 1, "ns1", "developer");
            remote
        };

        let dry_remote = make_remote();
        let dry = service_with_options(
            dry_remote.clone(),
            MemoryStore::default(),
            permissive_options(),
        )
        .execute_sync(USERS_CSV, MAPPING_CSV, true, false)
        .await
        .unwrap();
        assert!(dry_remote.mutations().is_empty());

        let live_remote = make_remote();
        let live = service_with_options(live_remote, MemoryStore::default(), permissive_options())
            .execute_sync(USERS_CSV, MAPPING_CSV, false, false)
            .await
            .unwrap();

        assert_eq!(dry.users_processed, live.users_processed);
        assert_eq!(dry.users_created, live.users_created);
        assert_eq!(dry.users_updated, live.users_updated);
        assert_eq!(dry.users_deleted, live.users_deleted);
        assert_eq!(dry.users_skipped, live.users_skipped);
    }

    #[tokio::test]
    async fn dry_run_never_stores_a_report() {
        let remote = Arc::new(FakeRemote::with_users(&[]));
        let store = MemoryStore::default();
        let svc = service(remote, store.clone());

        svc.execute_sync(USERS_CSV, MAPPING_CSV, true, false)
            .await
            .unwrap();
        assert!(store.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mass_deletion_halts_normal_and_yields_to_force() {
        // 10 remote users, inputs keep none: 100% deletions.
        let entries: Vec<(i64, String, String)> = (0..10)
            .map(|i| (i, format!("u{i}@example.com"), "active".to_string()))
            .collect();
        let remote = Arc::new(FakeRemote::default());
        *remote.users.lock().unwrap() = entries;
        remote.next_id.store(1000, Ordering::SeqCst);

        let empty_users = b"name,email,group\n";
        let svc = service(remote.clone(), MemoryStore::default());

        let halted = svc
            .execute_sync(empty_users, MAPPING_CSV, false, false)
            .await
            .unwrap();
        assert_eq!(halted.status, RunStatus::Error);
        assert_eq!(halted.users_deleted, 0);
        assert!(remote.mutations().is_empty());
        assert!(halted
            .logs
            .iter()
            .any(|l| l.contains("mass-deletion")));

        let forced = svc
            .execute_sync(empty_users, MAPPING_CSV, false, true)
            .await
            .unwrap();
        assert_eq!(forced.status, RunStatus::Success);
        assert_eq!(forced.users_deleted, 10);
    }

    #[tokio::test]
    async fn blocked_run_is_not_cached() {
        let remote = Arc::new(FakeRemote::with_users(&[(1, "only@example.com", "active")]));
        let store = MemoryStore::default();
        let svc = service(remote, store.clone());

        let empty_users = b"name,email,group\n";
        let halted = svc
            .execute_sync(empty_users, MAPPING_CSV, false, false)
            .await
            .unwrap();
        assert_eq!(halted.status, RunStatus::Error);
        assert!(store.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_email_is_counted_as_skipped() {
        let remote = Arc::new(FakeRemote::with_users(&[]));
        let svc = service(remote.clone(), MemoryStore::default());

        let users = b"name,email,group\nBad Row,not-an-email,eng\nOk Row,ok@example.com,eng\n";
        let report = svc
            .execute_sync(users, MAPPING_CSV, false, false)
            .await
            .unwrap();

        assert_eq!(report.users_processed, 1);
        assert_eq!(report.users_created, 1);
        assert_eq!(report.users_skipped, 1);
        assert!(!remote
            .mutations()
            .iter()
            .any(|m| m.contains("not-an-email")));
    }

    #[tokio::test]
    async fn duplicate_rows_collapse_to_one_action() {
        let remote = Arc::new(FakeRemote::with_users(&[]));
        let svc = service(remote.clone(), MemoryStore::default());

        let users =
            b"name,email,group\nJane,jane@example.com,eng\nJane Again,JANE@example.com,eng\n";
        let report = svc
            .execute_sync(users, MAPPING_CSV, false, false)
            .await
            .unwrap();

        assert_eq!(report.users_processed, 1);
        assert_eq!(report.users_created, 1);
        assert_eq!(report.users_skipped, 1);
        assert_eq!(
            remote
                .mutations()
                .iter()
                .filter(|m| m.starts_with("create "))
                .count(),
            1
        );
        assert!(report
            .logs
            .iter()
            .any(|l| l.contains("duplicate-user") || l.contains("duplicate row")));
    }

    #[tokio::test]
    async fn broken_report_store_does_not_fail_the_run() {
        let remote = Arc::new(FakeRemote::with_users(&[]));
        let svc = service(remote, BrokenStore);

        let report = svc
            .execute_sync(USERS_CSV, MAPPING_CSV, false, false)
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Success);
        assert!(report
            .logs
            .iter()
            .any(|l| l.contains("could not be persisted")));
    }

    #[tokio::test]
    async fn malformed_users_csv_is_fatal() {
        let remote = Arc::new(FakeRemote::with_users(&[]));
        let svc = service(remote, MemoryStore::default());

        let err = svc
            .execute_sync(b"nope\n", MAPPING_CSV, false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DirsyncError::Input(_)));
    }

    #[tokio::test]
    async fn inactive_remote_user_is_reactivated_with_roles() {
        let remote = Arc::new(FakeRemote::with_users(&[(
            5,
            "jane@example.com",
            "inactive",
        )]));
        let svc = service(remote.clone(), MemoryStore::default());

        let users = b"name,email,group\nJane Doe,jane@example.com,eng\n";
        let report = svc
            .execute_sync(users, MAPPING_CSV, false, false)
            .await
            .unwrap();

        assert_eq!(report.users_updated, 1);
        assert_eq!(remote.status_of(5), "active");
    }
}
