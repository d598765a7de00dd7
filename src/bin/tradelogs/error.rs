//! Error types for the trade-log crawler.

use tradelog_crawler::error::CrawlError;

use crate::config::ConfigError;

/// Main error type for the trade-log crawler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Environment configuration error: {0}")]
    EnvConfig(#[from] envy::Error),

    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(#[from] url::ParseError),

    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] alloy::primitives::hex::FromHexError),

    #[error("No contract addresses configured")]
    NoContracts,

    #[error("Crawl error: {0}")]
    Crawl(#[from] CrawlError),
}

pub type Result<T> = std::result::Result<T, Error>;
