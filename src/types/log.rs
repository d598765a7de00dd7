use alloy::{
    primitives::{Address, B256, Bytes, LogData, TxHash},
    rpc,
};
use serde::{Deserialize, Serialize};

use super::BlockNumber;
use crate::error::CrawlError;

/// Log entry as returned by the chain node, before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawLogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: BlockNumber,
    pub tx_hash: TxHash,
    pub log_index: u64,

    /// Set by the node for logs invalidated by a chain reorganization.
    pub removed: bool,
}

impl RawLogEntry {
    /// Event signature, if the log has any topics.
    pub fn signature(&self) -> Option<B256> {
        self.topics.first().copied()
    }

    /// Chain position the log is ordered by.
    pub fn position(&self) -> (BlockNumber, u64) {
        (self.block_number, self.log_index)
    }

    pub fn log_data(&self) -> LogData {
        LogData::new_unchecked(self.topics.clone(), self.data.clone())
    }
}

impl TryFrom<rpc::types::Log> for RawLogEntry {
    type Error = CrawlError;

    fn try_from(log: rpc::types::Log) -> Result<Self, Self::Error> {
        Ok(Self {
            block_number: log
                .block_number
                .ok_or(CrawlError::IncompleteLog("block number"))?,
            tx_hash: log
                .transaction_hash
                .ok_or(CrawlError::IncompleteLog("transaction hash"))?,
            log_index: log.log_index.ok_or(CrawlError::IncompleteLog("log index"))?,
            removed: log.removed,
            address: log.inner.address,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data,
        })
    }
}

/// Event along with the position of the log it was decoded from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext<T> {
    pub(crate) block_number: BlockNumber,
    pub(crate) tx_hash: TxHash,
    pub(crate) log_index: u64,
    pub(crate) event: T,
}

impl<T> EventContext<T> {
    pub(crate) fn new(block_number: BlockNumber, tx_hash: TxHash, log_index: u64, event: T) -> Self {
        Self {
            block_number,
            tx_hash,
            log_index,
            event,
        }
    }

    pub fn block_number(&self) -> BlockNumber {
        self.block_number
    }

    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    pub fn log_index(&self) -> u64 {
        self.log_index
    }

    pub fn event(&self) -> &T {
        &self.event
    }

    pub(crate) fn pass<O>(&self, other: O) -> EventContext<O> {
        EventContext {
            block_number: self.block_number,
            tx_hash: self.tx_hash,
            log_index: self.log_index,
            event: other,
        }
    }
}
