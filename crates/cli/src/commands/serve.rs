use std::path::Path;
use std::sync::Arc;

use tracing::info;

use dirsync_core::config::DirsyncConfig;
use dirsync_server::AppState;

/// Run the `serve` command: start the HTTP trigger server.
pub async fn run(config_path: &str, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = DirsyncConfig::load(Path::new(config_path))?;
    config.validate()?;
    if let Some(port) = port {
        config.server.port = port;
    }

    if config.server.api_key.is_none() {
        info!("server.api_key not set; requests will not be authenticated");
    }

    let state = Arc::new(AppState::from_config(config));
    dirsync_server::serve(state).await?;
    Ok(())
}
