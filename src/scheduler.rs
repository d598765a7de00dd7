//! Block window scheduling and checkpoint tracking.

use tracing::debug;

use crate::{
    error::CrawlError,
    types::{BlockNumber, BlockWindow},
};

/// Next window to crawl after `checkpoint`, or `None` if no block past the
/// confirmation lag is available yet.
///
/// The window spans at most `max_window_size` blocks and never reaches into
/// the last `confirmation_lag` blocks below `chain_head`.
pub fn next_window(
    checkpoint: BlockNumber,
    chain_head: BlockNumber,
    confirmation_lag: u64,
    max_window_size: u64,
) -> Option<BlockWindow> {
    let from = checkpoint.checked_add(1)?;
    let safe_head = chain_head.checked_sub(confirmation_lag)?;
    let to = checkpoint
        .saturating_add(max_window_size.max(1))
        .min(safe_head);
    (to >= from).then(|| BlockWindow::new(from, to))
}

/// Tracks the last fully processed block and hands out consecutive windows.
///
/// The checkpoint only moves forward through [`Self::commit`], which the
/// crawler calls after the window's batch was durably stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRangeScheduler {
    checkpoint: BlockNumber,
    confirmation_lag: u64,
    max_window_size: u64,
}

impl BlockRangeScheduler {
    pub fn new(checkpoint: BlockNumber, confirmation_lag: u64, max_window_size: u64) -> Self {
        Self {
            checkpoint,
            confirmation_lag,
            max_window_size: max_window_size.max(1),
        }
    }

    pub fn checkpoint(&self) -> BlockNumber {
        self.checkpoint
    }

    pub fn next_window(&self, chain_head: BlockNumber) -> Option<BlockWindow> {
        next_window(
            self.checkpoint,
            chain_head,
            self.confirmation_lag,
            self.max_window_size,
        )
    }

    /// Advances the checkpoint to the end of the window. The window must
    /// start right after the current checkpoint.
    pub fn commit(&mut self, window: BlockWindow) -> Result<(), CrawlError> {
        if window.from() != self.checkpoint + 1 {
            return Err(CrawlError::WindowOutOfOrder(
                self.checkpoint + 1,
                window.from(),
            ));
        }
        debug!(from = self.checkpoint, to = window.to(), "Checkpoint advanced");
        self.checkpoint = window.to();
        Ok(())
    }
}
