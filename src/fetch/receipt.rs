use std::sync::Arc;

use alloy::primitives::TxHash;

use super::SingleFlight;
use crate::{
    error::CrawlError,
    retry::RetryPolicy,
    source::{ChainSource, TxReceipt},
};

/// Transaction receipt lookup, memoized per transaction.
#[derive(derive_more::Debug)]
pub struct ReceiptFetcher<C> {
    #[debug(skip)]
    chain: Arc<C>,
    #[debug(skip)]
    cache: SingleFlight<TxHash, TxReceipt>,
    policy: RetryPolicy,
}

impl<C: ChainSource> ReceiptFetcher<C> {
    pub fn new(chain: Arc<C>, policy: RetryPolicy) -> Self {
        Self {
            chain,
            cache: SingleFlight::new(),
            policy,
        }
    }

    /// Receipt of the mined transaction. Status is reported as is, it is up
    /// to the caller to reject failed transactions.
    pub async fn fetch(&self, tx_hash: TxHash) -> Result<TxReceipt, CrawlError> {
        self.cache
            .get_or_try_fetch(tx_hash, || {
                self.policy.run(
                    "eth_getTransactionReceipt",
                    |_| false,
                    move || async move {
                        self.chain
                            .receipt(tx_hash)
                            .await?
                            .ok_or(CrawlError::MissingReceipt(tx_hash))
                    },
                )
            })
            .await
    }

    /// Forgets all memoized receipts.
    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
