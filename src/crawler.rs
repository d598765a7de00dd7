//! Crawl loop: schedule a window, fetch its logs, assemble records, commit.

use std::{collections::HashSet, sync::Arc, time::Duration};

use alloy::primitives::Address;
use tracing::{debug, error, info, warn};

use crate::{
    Deployment,
    assembler::{DEFAULT_WORKERS, EventAssembler},
    decoder::DecoderRegistry,
    error::{CrawlError, ErrorKind},
    fetch::LogFetcher,
    registry::ReserveRegistry,
    retry::RetryPolicy,
    scheduler::BlockRangeScheduler,
    source::ChainSource,
    store::{TradeStore, WindowBatch},
    types::{BlockNumber, BlockWindow},
};

pub const DEFAULT_CONFIRMATION_LAG: u64 = 12;
pub const DEFAULT_MAX_WINDOW_SIZE: u64 = 1_000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct CrawlerConfig {
    pub deployment: Deployment,

    /// Blocks below the chain head that are not crawled yet.
    pub confirmation_lag: u64,
    pub max_window_size: u64,

    /// Concurrent trade enrichments per window.
    pub workers: usize,

    /// Reserve addresses whose trades are flagged as excluded from volume.
    pub volume_excluded: HashSet<Address>,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
}

impl CrawlerConfig {
    pub fn new(deployment: Deployment) -> Self {
        Self {
            deployment,
            confirmation_lag: DEFAULT_CONFIRMATION_LAG,
            max_window_size: DEFAULT_MAX_WINDOW_SIZE,
            workers: DEFAULT_WORKERS,
            volume_excluded: HashSet::new(),
            retry: RetryPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Result of a single crawl cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// No confirmed blocks past the checkpoint.
    Idle { head: BlockNumber },

    /// Window was processed and durably stored.
    Committed { window: BlockWindow, records: usize },
}

/// Incremental crawler of a single deployment.
///
/// Owns the checkpoint and the live reserve registry, both only advanced
/// after the store accepted the window batch. A failed window is retried
/// from scratch by the next cycle.
pub struct Crawler<C, S> {
    chain: Arc<C>,
    store: S,
    logs: LogFetcher<C>,
    assembler: EventAssembler<C>,
    scheduler: BlockRangeScheduler,
    registry: ReserveRegistry,
    policy: RetryPolicy,
    poll_interval: Duration,
}

impl<C: ChainSource, S: TradeStore> Crawler<C, S> {
    /// Crawler decoding Katalyst events, resuming from the store checkpoint.
    pub async fn new(chain: Arc<C>, store: S, config: CrawlerConfig) -> Result<Self, CrawlError> {
        Self::with_decoders(chain, store, config, DecoderRegistry::katalyst()).await
    }

    pub async fn with_decoders(
        chain: Arc<C>,
        store: S,
        config: CrawlerConfig,
        decoders: DecoderRegistry,
    ) -> Result<Self, CrawlError> {
        let checkpoint = store
            .last_checkpoint()
            .await?
            .unwrap_or_else(|| config.deployment.deployed_at_block().saturating_sub(1));
        let registry = store.load_registry().await?;
        info!(
            checkpoint,
            reserves = registry.len(),
            contracts = config.deployment.contracts().len(),
            "Crawler initialized"
        );

        let logs = LogFetcher::new(
            chain.clone(),
            config.deployment.contracts().to_vec(),
            decoders.signatures(),
            config.retry,
        );
        let assembler = EventAssembler::new(chain.clone(), decoders, config.retry)
            .with_volume_excluded(config.volume_excluded)
            .with_workers(config.workers);
        Ok(Self {
            chain,
            store,
            logs,
            assembler,
            scheduler: BlockRangeScheduler::new(
                checkpoint,
                config.confirmation_lag,
                config.max_window_size,
            ),
            registry,
            policy: config.retry,
            poll_interval: config.poll_interval,
        })
    }

    /// Last block whose window is durably stored.
    pub fn checkpoint(&self) -> BlockNumber {
        self.scheduler.checkpoint()
    }

    pub fn registry(&self) -> &ReserveRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn assembler(&self) -> &EventAssembler<C> {
        &self.assembler
    }

    /// Processes the next confirmed window, if any.
    ///
    /// On error nothing is committed and the checkpoint stays put, so the
    /// same window is scheduled again.
    pub async fn poll_once(&mut self) -> Result<PollOutcome, CrawlError> {
        let head = self
            .policy
            .run("eth_blockNumber", |_| false, || self.chain.head_block())
            .await?;
        let Some(window) = self.scheduler.next_window(head) else {
            debug!(head, checkpoint = self.checkpoint(), "No confirmed blocks to crawl");
            return Ok(PollOutcome::Idle { head });
        };

        let logs = self.logs.fetch(window).await?;
        let assembled = self.assembler.assemble(&self.registry, &logs).await?;
        let batch = WindowBatch {
            window,
            records: assembled.records,
            registry: assembled.registry,
        };
        let records = batch.records.len();
        self.store.commit_window(&batch).await?;

        self.scheduler.commit(window)?;
        self.registry = batch.registry;
        self.assembler.receipts().clear();
        self.assembler
            .timestamps()
            .prune_below(self.checkpoint().saturating_add(1));
        info!(%window, head, logs = logs.len(), records, "Window committed");
        Ok(PollOutcome::Committed { window, records })
    }

    /// Crawls until a failure that needs operator attention.
    ///
    /// Transient and persistence failures are logged and the window is
    /// retried after the poll interval. Schema and consistency failures
    /// are returned.
    pub async fn run(&mut self) -> Result<(), CrawlError> {
        loop {
            match self.poll_once().await {
                Ok(PollOutcome::Committed { .. }) => continue,
                Ok(PollOutcome::Idle { .. }) => {}
                Err(err) => match err.kind() {
                    ErrorKind::Transient | ErrorKind::Persistence => {
                        warn!(checkpoint = self.checkpoint(), %err, kind = ?err.kind(), "Window failed, retrying");
                    }
                    ErrorKind::Schema | ErrorKind::Consistency => {
                        error!(checkpoint = self.checkpoint(), %err, kind = ?err.kind(), "Window failed, stopping");
                        return Err(err);
                    }
                },
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
