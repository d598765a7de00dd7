//! Trade-log crawler for Katalyst exchange deployments.
//!
//! This binary crawls confirmed blocks of the configured contracts and keeps
//! assembled trade records, the reserve registry and the checkpoint in a
//! JSON state file, resuming from it on restart.

mod config;
mod error;

use std::{process::exit, sync::Arc};

use alloy::{
    providers::{DynProvider, ProviderBuilder},
    rpc::client::RpcClient,
};
use clap::Parser;
use tracing::{error, info};
use url::Url;

use config::{CliConfig, EnvConfig};
use error::{Error, Result};
use tradelog_crawler::{crawler::Crawler, source::RpcChain, store::JsonFileStore};

#[tokio::main]
async fn main() {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    // Parse CLI arguments
    let cli_config = CliConfig::parse();

    // Set up logging
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run(cli_config).await {
        error!(%e, "Trade-log crawler encountered an error, shutting down");
        exit(1);
    }
}

async fn run(cli_config: CliConfig) -> Result<()> {
    let env_config = EnvConfig::from_env()?;
    let deployment = env_config.deployment()?;
    if deployment.contracts().is_empty() {
        return Err(Error::NoContracts);
    }
    let crawler_config = cli_config.to_crawler_config(deployment, env_config.call_timeout())?;
    let node_url = Url::parse(&env_config.node_rpc_url)?;

    // Retries are handled by the crawler's retry policy
    let provider = DynProvider::new(ProviderBuilder::new().connect_client(RpcClient::new_http(node_url)));
    let store = JsonFileStore::open(&env_config.state_file).await?;
    let mut crawler = Crawler::new(Arc::new(RpcChain::new(provider)), store, crawler_config).await?;

    tokio::select! {
        result = crawler.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }
    info!(checkpoint = crawler.checkpoint(), "Crawler stopped");
    Ok(())
}
