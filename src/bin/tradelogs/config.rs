//! Configuration for the trade-log crawler.
//!
//! Configuration comes from two sources:
//! - Environment variables (via .env file or shell): node and deployment
//! - CLI arguments: crawl tuning

use std::{collections::HashSet, time::Duration};

use alloy::primitives::Address;
use clap::Parser;
use tradelog_crawler::{
    Deployment,
    crawler::{CrawlerConfig, DEFAULT_CONFIRMATION_LAG, DEFAULT_MAX_WINDOW_SIZE},
    retry::RetryPolicy,
};

/// Default per-call deadline.
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Environment configuration (node connection, deployment).
#[derive(Debug, serde::Deserialize)]
pub struct EnvConfig {
    /// RPC URL for the node
    pub node_rpc_url: String,

    /// Comma-separated addresses of the contracts emitting the crawled events
    pub contract_addresses: String,

    /// Block number the contracts were deployed at
    pub deployed_at_block: u64,

    /// Path of the JSON state file
    pub state_file: String,

    /// Optional deadline of a single chain call (default: 30s)
    pub timeout_seconds: Option<u64>,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// Parse the contract addresses.
    pub fn contract_addresses(&self) -> Result<Vec<Address>, alloy::primitives::hex::FromHexError> {
        self.contract_addresses
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::parse)
            .collect()
    }

    pub fn deployment(&self) -> Result<Deployment, alloy::primitives::hex::FromHexError> {
        Ok(Deployment::new(
            self.contract_addresses()?,
            self.deployed_at_block,
        ))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))
    }
}

/// CLI arguments for crawl tuning.
#[derive(Debug, Parser)]
#[command(name = "tradelogs")]
#[command(about = "Crawls Katalyst exchange trade logs into a local state file")]
pub struct CliConfig {
    /// Blocks behind the chain head that are not crawled yet
    #[arg(long, default_value_t = DEFAULT_CONFIRMATION_LAG)]
    pub confirmations: u64,

    /// Maximum number of blocks per crawled window
    #[arg(long, default_value_t = DEFAULT_MAX_WINDOW_SIZE)]
    pub max_window: u64,

    /// Concurrent receipt/timestamp lookups per window
    #[arg(long, default_value_t = 8)]
    pub workers: usize,

    /// Attempts of a single chain call before the window fails
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[arg(long, default_value_t = 500)]
    pub initial_backoff_ms: u64,

    /// Upper bound of the retry delay
    #[arg(long, default_value_t = 30_000)]
    pub max_backoff_ms: u64,

    /// Delay between polls once caught up with the chain head
    #[arg(long, default_value_t = 15)]
    pub poll_interval_secs: u64,

    /// Reserve addresses whose trades are excluded from volume (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub volume_excluded_reserves: Vec<String>,
}

impl CliConfig {
    /// Combine CLI tuning with the deployment into the crawler config.
    pub fn to_crawler_config(
        &self,
        deployment: Deployment,
        call_timeout: Duration,
    ) -> Result<CrawlerConfig, ConfigError> {
        if self.max_window == 0 {
            return Err(ConfigError::ZeroWindowSize);
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::InvalidBackoffRelation);
        }

        let volume_excluded = self
            .volume_excluded_reserves
            .iter()
            .map(|a| {
                a.trim()
                    .parse::<Address>()
                    .map_err(|_| ConfigError::InvalidReserveAddress(a.clone()))
            })
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(CrawlerConfig {
            deployment,
            confirmation_lag: self.confirmations,
            max_window_size: self.max_window,
            workers: self.workers,
            volume_excluded,
            retry: RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.initial_backoff_ms),
                Duration::from_millis(self.max_backoff_ms),
                call_timeout,
            ),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_window cannot be zero")]
    ZeroWindowSize,

    #[error("workers cannot be zero")]
    ZeroWorkers,

    #[error("max_attempts cannot be zero")]
    ZeroAttempts,

    #[error("initial_backoff_ms must not exceed max_backoff_ms")]
    InvalidBackoffRelation,

    #[error("Invalid reserve address {0}")]
    InvalidReserveAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> CliConfig {
        CliConfig {
            confirmations: 7,
            max_window: 500,
            workers: 4,
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            poll_interval_secs: 5,
            volume_excluded_reserves: vec![],
        }
    }

    fn deployment() -> Deployment {
        Deployment::new(vec![Address::with_last_byte(1)], 100)
    }

    #[test]
    fn test_cli_config_to_crawler_config() {
        let cli = CliConfig {
            volume_excluded_reserves: vec![
                "0x63825c174ab367968ec60f061753d3bbd36a0d8f".to_string(),
                " 0x0000000000000000000000000000000000000001".to_string(),
            ],
            ..cli()
        };

        let config = cli
            .to_crawler_config(deployment(), Duration::from_secs(10))
            .unwrap();
        assert_eq!(config.confirmation_lag, 7);
        assert_eq!(config.max_window_size, 500);
        assert_eq!(config.workers, 4);
        assert_eq!(config.retry.max_attempts(), 3);
        assert_eq!(config.retry.call_timeout(), Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.volume_excluded.len(), 2);
        assert!(config.volume_excluded.contains(&Address::with_last_byte(1)));
    }

    #[test]
    fn test_invalid_tuning() {
        let timeout = Duration::from_secs(1);
        let zero_window = CliConfig { max_window: 0, ..cli() };
        assert!(matches!(
            zero_window.to_crawler_config(deployment(), timeout),
            Err(ConfigError::ZeroWindowSize)
        ));

        let zero_workers = CliConfig { workers: 0, ..cli() };
        assert!(matches!(
            zero_workers.to_crawler_config(deployment(), timeout),
            Err(ConfigError::ZeroWorkers)
        ));

        let zero_attempts = CliConfig { max_attempts: 0, ..cli() };
        assert!(matches!(
            zero_attempts.to_crawler_config(deployment(), timeout),
            Err(ConfigError::ZeroAttempts)
        ));

        let inverted = CliConfig {
            initial_backoff_ms: 2_000,
            ..cli()
        };
        assert!(matches!(
            inverted.to_crawler_config(deployment(), timeout),
            Err(ConfigError::InvalidBackoffRelation)
        ));
    }

    #[test]
    fn test_invalid_reserve_address() {
        let cli = CliConfig {
            volume_excluded_reserves: vec!["0xnope".to_string()],
            ..cli()
        };
        assert!(matches!(
            cli.to_crawler_config(deployment(), Duration::from_secs(1)),
            Err(ConfigError::InvalidReserveAddress(a)) if a == "0xnope"
        ));
    }

    #[test]
    fn test_contract_addresses() {
        let env = EnvConfig {
            node_rpc_url: "http://localhost:8545".to_string(),
            contract_addresses: "0x0000000000000000000000000000000000000001, 0x0000000000000000000000000000000000000002,".to_string(),
            deployed_at_block: 10,
            state_file: "state.json".to_string(),
            timeout_seconds: None,
        };
        let deployment = env.deployment().unwrap();
        assert_eq!(
            deployment.contracts(),
            &[Address::with_last_byte(1), Address::with_last_byte(2)]
        );
        assert_eq!(deployment.deployed_at_block(), 10);
        assert_eq!(env.call_timeout(), Duration::from_secs(30));
    }
}
