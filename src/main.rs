// src/main.rs
use std::process;

use bitebattle_core::{Config, Store};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            process::exit(1);
        }
    };

    let store = match Store::connect(&config.database_url, config.max_connections).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to connect to the database: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = store.ensure_schema().await {
        error!("Failed to prepare schema: {e}");
        store.close().await;
        process::exit(1);
    }

    info!(database = %config.database_url, "store ready");
    store.close().await;
}
