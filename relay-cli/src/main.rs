//! relay-store CLI: list, inspect, import/export and purge relayed messages.
//! Config from env (.env supported) and optional CLI args.

use anyhow::{Context, Result};
use clap::Parser;
use message_store::MessageStore;
use relay_cli::{init_tracing, load_config, log_file, run, Cli};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_path = log_file();
    init_tracing(&log_path).with_context(|| format!("Initialise logging to {}", log_path))?;

    let config = load_config(cli.database)
        .context("Load store config from .env (MESSAGE_STORE_URL, MESSAGE_STORE_MAX_CONNECTIONS)")?;
    info!(database_url = %config.database_url, command = ?cli.command, "Running command");

    let store = MessageStore::with_current_runtime(config);
    let result = run(&store, cli.command).await;
    store.close().await;
    result
}
