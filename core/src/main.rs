use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlite_store::{SqliteStore, StoreOptions};
use store_api::DocumentStore;
use tokio::io::BufReader;
use tracing::info;

use chatsync::{
    app,
    cli::Cli,
    config::{Config, StoreLocation},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    let filter = if config.logging_enabled { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let store: Arc<dyn DocumentStore> = match &config.store {
        StoreLocation::Memory => {
            info!("using in-memory store");
            Arc::new(SqliteStore::open_in_memory().context("open in-memory store")?)
        }
        StoreLocation::File(path) => {
            info!(path = %path.display(), "using store file");
            let options = StoreOptions {
                poll_interval: Some(config.poll_interval),
                ..Default::default()
            };
            Arc::new(SqliteStore::open(path, options).context("open store")?)
        }
    };

    let stdin = BufReader::new(tokio::io::stdin());
    app::run(store, stdin, std::io::stdout()).await
}
