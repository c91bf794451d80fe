use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "dirsync",
    about = "Directory to identity-service user and role sync",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "dirsync.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run one sync from local CSV files or the stored datasets
    Sync {
        /// Users CSV path; defaults to the stored dataset
        #[arg(long)]
        users: Option<String>,
        /// Group mapping CSV path; defaults to the stored dataset
        #[arg(long)]
        mapping: Option<String>,
        /// Preview changes without applying
        #[arg(long)]
        dry_run: bool,
        /// Rerun even when a cached report exists and apply past blocking findings
        #[arg(long)]
        force: bool,
        /// Write the full run report as JSON to stdout
        #[arg(long)]
        json: bool,
    },
    /// Start the HTTP trigger server
    Serve {
        /// Port to listen on, overriding the configuration file
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sync {
            users,
            mapping,
            dry_run,
            force,
            json,
        } => {
            commands::sync::run(
                &cli.config,
                users.as_deref(),
                mapping.as_deref(),
                dry_run,
                force,
                json,
            )
            .await?;
        }
        Commands::Serve { port } => {
            commands::serve::run(&cli.config, port).await?;
        }
    }

    Ok(())
}
