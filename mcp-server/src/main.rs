mod config;
mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use config::Config;
use telemetry::{init_telemetry, log_startup_info};
use weft_core::{GitDriver, TaskService};
use weft_database::SqliteTaskStore;
use weft_git::CliGitDriver;
use weft_protocol::StdioMcpServer;

#[derive(Parser)]
#[command(name = "weft-mcp")]
#[command(about = "Multi-agent task coordinator speaking MCP over stdio")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Store file path (overrides TASK_DB_PATH and config)
    #[arg(long, env = "TASK_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Repository root (defaults to discovering from the working directory)
    #[arg(long, env = "REPO_ROOT")]
    repo_root: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<String>,

    /// Log level override
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(config_file) => Config::from_file(config_file)?,
        None => Config::from_env()?,
    };

    if let Some(db_path) = &cli.db_path {
        config.database.path = Some(db_path.display().to_string());
    }
    if let Some(repo_root) = &cli.repo_root {
        config.git.repo_root = Some(repo_root.display().to_string());
    }
    if let Some(log_level) = &cli.log_level {
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config(&cli).context("Failed to load configuration")?;

    init_telemetry(&config.logging).context("Failed to initialize telemetry")?;

    if let Err(e) = config.validate() {
        error!(error = %e, "configuration validation failed");
        std::process::exit(1);
    }
    log_startup_info(&config);

    // Open the store (parent directory auto-created) and bring the
    // schema up to date.
    let db_path = config.database_path();
    let store = SqliteTaskStore::open(&db_path)
        .await
        .with_context(|| format!("Failed to open store at {}", db_path.display()))?;
    store.migrate().await.context("Failed to run migrations")?;
    info!(path = %db_path.display(), "store ready");

    // Discover the repository the coordinator manages.
    let git = match &config.git.repo_root {
        Some(root) => CliGitDriver::discover(Path::new(root)).await,
        None => CliGitDriver::discover(Path::new(".")).await,
    }
    .context("Failed to locate a git repository")?;
    info!(repo_root = %git.repo_root().display(), "repository discovered");

    let service = TaskService::new(Arc::new(store), Arc::new(git));
    let server = StdioMcpServer::new(service);

    // Serve until stdin closes or a shutdown signal arrives.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM handler");
            let mut sigint =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
                    .expect("Failed to register SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
            }
        }

        #[cfg(windows)]
        {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl+c");
            info!("received Ctrl+C, shutting down");
        }

        let _ = shutdown_tx.send(());
    });

    tokio::select! {
        result = server.serve() => {
            result.context("MCP server error")?;
            info!("server exited cleanly");
        }
        _ = shutdown_rx => {
            info!("shutdown signal received, stopping server");
        }
    }

    Ok(())
}
