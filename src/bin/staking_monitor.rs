//! Keeps tracked staking accounts in sync on every configured chain.
//!
//! Usage: `staking-monitor [config.toml]`. Without a file the configuration is
//! read from the environment (a `.env` file is honored either way).

use eyre::Result;
use snx_staking_sync::data_sync::{SyncConfig, SyncServiceBuilder};
use snx_staking_sync::store::InMemoryAccountStore;
use snx_staking_sync::utils::ConfigSectionLoader;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("note: no .env loaded: {}", e);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_line_number(true)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            SyncConfig::load_section_from_file(path).await?
        }
        None => SyncConfig::from_env()?,
    };
    if config.chains.is_empty() {
        eyre::bail!("no chains configured");
    }
    for chain in &config.chains {
        info!("{}: rpc {} resolver {}", chain.chain, redact(&chain.rpc_url), chain.address_resolver);
    }

    // accounts are registered by the surrounding application through the registrar
    let store = Arc::new(InMemoryAccountStore::new());
    let mut service = SyncServiceBuilder::new().with_config(config).with_store(store).build()?;
    service.start()?;

    tokio::select! {
        result = service.wait() => {
            if let Err(e) = &result {
                error!("Sync stopped: {:?}", e);
            }
            service.stop().await;
            result
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
            service.stop().await;
            Ok(())
        }
    }
}

/// Hosted RPC URLs carry the API key in the last path segment.
fn redact(rpc_url: &str) -> String {
    match rpc_url.rsplit_once('/') {
        Some((base, key)) if key.len() > 8 => format!("{}/{}...", base, key.chars().take(4).collect::<String>()),
        _ => rpc_url.to_string(),
    }
}
