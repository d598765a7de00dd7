//! Chain data sources the crawler depends on.

use alloy::{
    eips::BlockNumberOrTag,
    network::ReceiptResponse,
    primitives::{Address, B256, TxHash},
    providers::Provider,
    rpc::types::Filter,
};

use crate::{
    error::CrawlError,
    types::{BlockNumber, BlockWindow, RawLogEntry, Timestamp},
};

/// Gas accounting and outcome of a mined transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub from: Address,
    pub gas_used: u64,
    pub gas_price: u128,

    /// `true` if the transaction succeeded.
    pub status: bool,
}

/// Log, receipt and block metadata queries. Single attempts, no retries,
/// deadlines or caching at this level.
#[allow(async_fn_in_trait)]
pub trait ChainSource {
    /// Latest block number known to the node.
    async fn head_block(&self) -> Result<BlockNumber, CrawlError>;

    /// Logs emitted by `addresses` within `window` whose first topic is one of `signatures`.
    async fn logs(
        &self,
        addresses: &[Address],
        signatures: &[B256],
        window: BlockWindow,
    ) -> Result<Vec<RawLogEntry>, CrawlError>;

    /// `None` if the node does not know the transaction.
    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, CrawlError>;

    /// `None` if the block does not exist yet.
    async fn block_timestamp(&self, block: BlockNumber) -> Result<Option<Timestamp>, CrawlError>;
}

/// [`ChainSource`] backed by JSON-RPC [`Provider`].
///
/// It is recommended to setup provider without
/// [`alloy::transports::layers::RetryBackoffLayer`], retries are applied by
/// the crawler's [`crate::retry::RetryPolicy`] instead.
#[derive(Clone, Debug)]
pub struct RpcChain<P> {
    provider: P,
}

impl<P: Provider> RpcChain<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: Provider> ChainSource for RpcChain<P> {
    async fn head_block(&self) -> Result<BlockNumber, CrawlError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn logs(
        &self,
        addresses: &[Address],
        signatures: &[B256],
        window: BlockWindow,
    ) -> Result<Vec<RawLogEntry>, CrawlError> {
        let filter = Filter::new()
            .address(addresses.to_vec())
            .event_signature(signatures.to_vec())
            .from_block(window.from())
            .to_block(window.to());
        self.provider
            .get_logs(&filter)
            .await?
            .into_iter()
            .map(RawLogEntry::try_from)
            .collect()
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, CrawlError> {
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;
        Ok(receipt.map(|r| TxReceipt {
            from: r.from(),
            gas_used: r.gas_used(),
            gas_price: r.effective_gas_price(),
            status: r.status(),
        }))
    }

    async fn block_timestamp(&self, block: BlockNumber) -> Result<Option<Timestamp>, CrawlError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block))
            .await?;
        Ok(block.map(|b| b.header.timestamp))
    }
}
