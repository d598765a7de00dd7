use std::collections::BTreeMap;

use super::{TradeStore, WindowBatch};
use crate::{
    error::CrawlError,
    registry::ReserveRegistry,
    types::{BlockNumber, CrawlRecord, RecordKey, TradeRecord},
};

/// Store keeping everything in memory, for tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    checkpoint: Option<BlockNumber>,
    registry: ReserveRegistry,
    records: BTreeMap<RecordKey, CrawlRecord>,
    commits: usize,
    fail_commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store resuming from the checkpoint.
    pub fn with_checkpoint(checkpoint: BlockNumber, registry: ReserveRegistry) -> Self {
        Self {
            checkpoint: Some(checkpoint),
            registry,
            ..Default::default()
        }
    }

    /// Next `n` commits fail without applying anything.
    pub fn fail_next_commits(&mut self, n: usize) {
        self.fail_commits = n;
    }

    pub fn checkpoint(&self) -> Option<BlockNumber> {
        self.checkpoint
    }

    pub fn registry(&self) -> &ReserveRegistry {
        &self.registry
    }

    /// Stored records in (tx hash, log index) order.
    pub fn records(&self) -> impl Iterator<Item = &CrawlRecord> {
        self.records.values()
    }

    /// Stored trades in chain order.
    pub fn trades(&self) -> Vec<&TradeRecord> {
        let mut trades = self
            .records
            .values()
            .filter_map(CrawlRecord::as_trade)
            .collect::<Vec<_>>();
        trades.sort_by_key(|t| (t.block_number, t.log_index));
        trades
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of successful commits.
    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl TradeStore for MemoryStore {
    async fn last_checkpoint(&self) -> Result<Option<BlockNumber>, CrawlError> {
        Ok(self.checkpoint)
    }

    async fn load_registry(&self) -> Result<ReserveRegistry, CrawlError> {
        Ok(self.registry.clone())
    }

    async fn commit_window(&mut self, batch: &WindowBatch) -> Result<(), CrawlError> {
        if self.fail_commits > 0 {
            self.fail_commits -= 1;
            return Err(CrawlError::Persistence(format!(
                "injected failure committing {}",
                batch.window
            )));
        }
        self.records
            .extend(batch.records.iter().map(|r| (r.key(), r.clone())));
        self.registry = batch.registry.clone();
        self.checkpoint = Some(batch.checkpoint());
        self.commits += 1;
        Ok(())
    }
}
