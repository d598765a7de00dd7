//! Durable storage of crawled windows.
//!
//! A window is committed as one [`WindowBatch`]: its records, the reserve
//! registry as of the window end and the new checkpoint. Implementations must
//! apply a batch atomically, either all of it is visible afterwards or none
//! of it, and must upsert records by [`crate::types::RecordKey`] so that
//! re-committing a window leaves the stored set unchanged.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::{
    error::CrawlError,
    registry::ReserveRegistry,
    types::{BlockNumber, BlockWindow, CrawlRecord},
};

/// Everything produced by processing one block window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowBatch {
    pub window: BlockWindow,
    pub records: Vec<CrawlRecord>,
    pub registry: ReserveRegistry,
}

impl WindowBatch {
    /// Checkpoint the batch advances the store to.
    pub fn checkpoint(&self) -> BlockNumber {
        self.window.to()
    }
}

#[allow(async_fn_in_trait)]
pub trait TradeStore {
    /// Last block whose window was committed, `None` for a fresh store.
    async fn last_checkpoint(&self) -> Result<Option<BlockNumber>, CrawlError>;

    /// Reserve registry as of the last checkpoint.
    async fn load_registry(&self) -> Result<ReserveRegistry, CrawlError>;

    /// Atomically upserts the records, replaces the registry and advances
    /// the checkpoint to the end of the window.
    async fn commit_window(&mut self, batch: &WindowBatch) -> Result<(), CrawlError>;
}
