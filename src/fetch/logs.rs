use std::sync::Arc;

use alloy::primitives::{Address, B256};
use itertools::Itertools;
use tracing::{debug, warn};

use crate::{
    error::CrawlError,
    retry::RetryPolicy,
    source::ChainSource,
    types::{BlockWindow, RawLogEntry},
};

/// Fetches logs of the crawled contracts for a block window.
///
/// Windows refused by the provider as too large (or timing out) are
/// bisected recursively, halves are fetched independently and recombined
/// in chain order.
pub struct LogFetcher<C> {
    chain: Arc<C>,
    addresses: Vec<Address>,
    signatures: Vec<B256>,
    policy: RetryPolicy,
}

impl<C: ChainSource> LogFetcher<C> {
    pub fn new(
        chain: Arc<C>,
        addresses: Vec<Address>,
        signatures: Vec<B256>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            chain,
            addresses,
            signatures,
            policy,
        }
    }

    /// Logs of the window, live logs strictly ascending by (block, log index).
    ///
    /// Removed logs are passed through and may share a position with the
    /// log that replaced them.
    pub async fn fetch(&self, window: BlockWindow) -> Result<Vec<RawLogEntry>, CrawlError> {
        let mut logs = Vec::new();
        // Stack of pending ranges, the lower half is always on top
        let mut pending = vec![window];
        while let Some(range) = pending.pop() {
            match self.fetch_range(range).await {
                Ok(mut batch) => logs.append(&mut batch),
                Err(err) => match range.bisect() {
                    Some((lo, hi)) if self.policy.should_split(&err, range.len()) => {
                        debug!(%range, %err, "Splitting log query");
                        pending.push(hi);
                        pending.push(lo);
                    }
                    _ => return Err(err),
                },
            }
        }
        ensure_chain_order(&logs)?;
        Ok(logs)
    }

    async fn fetch_range(&self, range: BlockWindow) -> Result<Vec<RawLogEntry>, CrawlError> {
        let span = range.len();
        self.policy
            .run(
                "eth_getLogs",
                |err| self.policy.should_split(err, span),
                move || self.chain.logs(&self.addresses, &self.signatures, range),
            )
            .await
            .inspect_err(|err| {
                if !self.policy.should_split(err, span) {
                    warn!(%range, %err, "Log query failed");
                }
            })
    }
}

fn ensure_chain_order(logs: &[RawLogEntry]) -> Result<(), CrawlError> {
    match logs
        .iter()
        .filter(|log| !log.removed)
        .tuple_windows()
        .find(|(prev, next)| prev.position() >= next.position())
    {
        Some((prev, next)) => Err(CrawlError::LogsOutOfOrder(
            prev.block_number,
            prev.log_index,
            next.block_number,
            next.log_index,
        )),
        None => Ok(()),
    }
}
