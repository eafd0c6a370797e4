// Standalone MCP server binary

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use userbook_core::storage::JsonFileUserStore;
use userbook_mcp::{McpConfig, McpServer};

#[derive(Parser, Debug)]
#[command(name = "userbook-mcp")]
#[command(about = "MCP server for creating and reading user records", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "USERBOOK_CONFIG", default_value = "userbook.toml")]
    config: PathBuf,

    /// Data directory for storage
    #[arg(short, long, env = "USERBOOK_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; stdout is reserved for the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();

    let args = Args::parse();

    tracing::info!("Userbook MCP Server starting...");
    tracing::info!("Data directory: {}", args.data_dir.display());

    let config = McpConfig::load(&args.config, args.data_dir)?;

    let store = JsonFileUserStore::new(config.users_path());
    store
        .init()
        .await
        .context("Failed to initialize user store")?;
    tracing::info!("User store: {}", store.path().display());

    let server = McpServer::for_users(config.server.name.clone(), Arc::new(store))?
        .with_max_message_bytes(config.server.max_message_bytes);
    server.start().await?;

    Ok(())
}
