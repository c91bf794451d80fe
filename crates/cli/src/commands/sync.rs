use std::path::Path;
use std::sync::Arc;

use tracing::info;

use dirsync_core::config::DirsyncConfig;
use dirsync_core::models::report::RunStatus;
use dirsync_engine::cache::ResultCache;
use dirsync_engine::client::HttpDirectoryClient;
use dirsync_engine::service::SyncService;
use dirsync_engine::store::{FsObjectStore, ObjectStore};

/// Run the `sync` command: one reconciliation pass from local CSV files,
/// falling back to the stored datasets when paths are omitted.
pub async fn run(
    config_path: &str,
    users_path: Option<&str>,
    mapping_path: Option<&str>,
    dry_run: bool,
    force: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = DirsyncConfig::load(Path::new(config_path))?;
    config.validate()?;

    let store = Arc::new(FsObjectStore::new(&config.storage.root));
    let users_bytes = read_dataset(&store, users_path, &config.storage.users_key).await?;
    let mapping_bytes = read_dataset(&store, mapping_path, &config.storage.mapping_key).await?;

    let client = HttpDirectoryClient::new(&config.remote);
    let cache = ResultCache::new(store, &config.storage.results_prefix);
    let service = SyncService::new(
        client,
        cache,
        config.sync.clone(),
        config.remote.organization_id,
    );

    info!(dry_run, force, "Starting sync");
    let report = service
        .execute_sync(&users_bytes, &mapping_bytes, dry_run, force)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in &report.logs {
            println!("{line}");
        }
        println!();
        println!(
            "{} processed, {} created, {} updated, {} deleted, {} skipped",
            report.users_processed,
            report.users_created,
            report.users_updated,
            report.users_deleted,
            report.users_skipped
        );
    }

    if report.status == RunStatus::Error {
        anyhow::bail!("sync halted by a blocking finding; rerun with --force to override");
    }
    Ok(())
}

async fn read_dataset(
    store: &Arc<FsObjectStore>,
    path: Option<&str>,
    stored_key: &str,
) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => Ok(tokio::fs::read(path).await?),
        None => store.get(stored_key).await?.ok_or_else(|| {
            anyhow::anyhow!("no dataset at stored key '{stored_key}'; pass an explicit path")
        }),
    }
}
