use std::sync::Arc;

use super::SingleFlight;
use crate::{
    error::CrawlError,
    retry::RetryPolicy,
    source::ChainSource,
    types::{BlockNumber, Timestamp},
};

/// Block number -> wall-clock time, memoized for the process lifetime.
///
/// Only blocks behind the confirmation lag are resolved, so resolved
/// timestamps are never invalidated.
#[derive(derive_more::Debug)]
pub struct TimestampResolver<C> {
    #[debug(skip)]
    chain: Arc<C>,
    #[debug(skip)]
    cache: SingleFlight<BlockNumber, Timestamp>,
    policy: RetryPolicy,
}

impl<C: ChainSource> TimestampResolver<C> {
    pub fn new(chain: Arc<C>, policy: RetryPolicy) -> Self {
        Self {
            chain,
            cache: SingleFlight::new(),
            policy,
        }
    }

    pub async fn resolve(&self, block: BlockNumber) -> Result<Timestamp, CrawlError> {
        self.cache
            .get_or_try_fetch(block, || {
                self.policy.run("eth_getBlockByNumber", |_| false, move || async move {
                    self.chain
                        .block_timestamp(block)
                        .await?
                        .ok_or(CrawlError::MissingBlock(block))
                })
            })
            .await
    }

    /// Drops timestamps of blocks below `block`.
    pub fn prune_below(&self, block: BlockNumber) {
        self.cache.retain(|b| *b >= block);
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
