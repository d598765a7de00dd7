//! Window assembly: raw logs -> finished records.
//!
//! The assembler makes a sequential pass over the window logs in chain
//! order, decoding them and applying registry events to a working copy of
//! [`ReserveRegistry`], then enriches decoded trades with receipts and block
//! timestamps concurrently. The result is all-or-nothing: either every
//! record of the window in input order, or the first error.

use std::{collections::HashSet, sync::Arc};

use alloy::primitives::{Address, U256};
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info};

use crate::{
    decoder::DecoderRegistry,
    error::CrawlError,
    fetch::{ReceiptFetcher, TimestampResolver},
    registry::ReserveRegistry,
    retry::RetryPolicy,
    source::ChainSource,
    types::{CrawlRecord, EventContext, ExchangeEvent, RawLogEntry, TradeExecuted, TradeRecord},
};

/// Default number of concurrent trade enrichments within a window.
pub const DEFAULT_WORKERS: usize = 8;

/// Records of a window along with the registry state after applying it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssembledWindow {
    pub records: Vec<CrawlRecord>,
    pub registry: ReserveRegistry,
}

impl AssembledWindow {
    pub fn trades(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter().filter_map(CrawlRecord::as_trade)
    }
}

/// Output slot of the sequential pass.
enum Slot {
    Ready(CrawlRecord),
    Trade {
        trade: EventContext<TradeExecuted>,
        volume_excluded: bool,
    },
}

/// Turns ordered window logs into records.
pub struct EventAssembler<C> {
    decoders: DecoderRegistry,
    receipts: ReceiptFetcher<C>,
    timestamps: TimestampResolver<C>,
    volume_excluded: HashSet<Address>,
    workers: usize,
}

impl<C: ChainSource> EventAssembler<C> {
    pub fn new(chain: Arc<C>, decoders: DecoderRegistry, policy: RetryPolicy) -> Self {
        Self {
            decoders,
            receipts: ReceiptFetcher::new(chain.clone(), policy),
            timestamps: TimestampResolver::new(chain, policy),
            volume_excluded: HashSet::new(),
            workers: DEFAULT_WORKERS,
        }
    }

    /// Sets reserve addresses whose trades are excluded from volume statistics.
    pub fn with_volume_excluded(mut self, reserves: HashSet<Address>) -> Self {
        self.volume_excluded = reserves;
        self
    }

    /// Sets the number of concurrent trade enrichments (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    pub fn receipts(&self) -> &ReceiptFetcher<C> {
        &self.receipts
    }

    pub fn timestamps(&self) -> &TimestampResolver<C> {
        &self.timestamps
    }

    /// Assembles the window logs, expected in ascending chain order.
    ///
    /// `registry` is left untouched, the updated state is returned along
    /// with the records.
    pub async fn assemble(
        &self,
        registry: &ReserveRegistry,
        logs: &[RawLogEntry],
    ) -> Result<AssembledWindow, CrawlError> {
        let mut registry = registry.clone();
        let slots = self.decode_all(&mut registry, logs)?;

        let mut records: Vec<Option<CrawlRecord>> = Vec::with_capacity(slots.len());
        let mut trades = Vec::new();
        for (idx, slot) in slots.into_iter().enumerate() {
            match slot {
                Slot::Ready(record) => records.push(Some(record)),
                Slot::Trade {
                    trade,
                    volume_excluded,
                } => {
                    records.push(None);
                    trades.push((idx, trade, volume_excluded));
                }
            }
        }

        let trade_count = trades.len();
        let enriched: Vec<(usize, TradeRecord)> = stream::iter(trades)
            .map(|(idx, trade, volume_excluded)| async move {
                let record = self.enrich(trade, volume_excluded).await?;
                Ok::<_, CrawlError>((idx, record))
            })
            .buffer_unordered(self.workers)
            .try_collect()
            .await?;
        for (idx, record) in enriched {
            records[idx] = Some(CrawlRecord::Trade(record));
        }

        let records: Vec<CrawlRecord> = records.into_iter().flatten().collect();
        info!(
            logs = logs.len(),
            records = records.len(),
            trades = trade_count,
            "Window assembled"
        );
        Ok(AssembledWindow { records, registry })
    }

    /// Sequential pass: decode every live log and apply registry events in order.
    fn decode_all(
        &self,
        registry: &mut ReserveRegistry,
        logs: &[RawLogEntry],
    ) -> Result<Vec<Slot>, CrawlError> {
        let mut slots = Vec::with_capacity(logs.len());
        for log in logs {
            if log.removed {
                debug!(tx_hash = %log.tx_hash, log_index = log.log_index, "Skipping removed log");
                continue;
            }
            let decoded = self.decoders.decode(log)?;
            let slot = match decoded.event() {
                ExchangeEvent::FeeDistributed(e) => {
                    Slot::Ready(CrawlRecord::FeeDistribution(decoded.pass(e.clone())))
                }
                ExchangeEvent::ReserveRegistered(e) => {
                    registry.apply_registration(e);
                    Slot::Ready(CrawlRecord::ReserveRegistration(decoded.pass(*e)))
                }
                ExchangeEvent::RebateWalletUpdated(e) => {
                    registry.apply_rebate_wallet(e);
                    Slot::Ready(CrawlRecord::RebateWalletUpdate(decoded.pass(*e)))
                }
                ExchangeEvent::TradeExecuted(e) => Slot::Trade {
                    volume_excluded: registry.any_excluded(e.reserves(), &self.volume_excluded),
                    trade: decoded.pass(e.clone()),
                },
            };
            slots.push(slot);
        }
        Ok(slots)
    }

    async fn enrich(
        &self,
        trade: EventContext<TradeExecuted>,
        volume_excluded: bool,
    ) -> Result<TradeRecord, CrawlError> {
        let (receipt, timestamp) = futures::try_join!(
            self.receipts.fetch(trade.tx_hash()),
            self.timestamps.resolve(trade.block_number()),
        )?;
        if !receipt.status {
            return Err(CrawlError::FailedTransaction(trade.tx_hash()));
        }
        let src_amount = trade
            .event()
            .src_amount()
            .ok_or_else(|| CrawlError::MalformedEvent {
                tx_hash: trade.tx_hash(),
                log_index: trade.log_index(),
                reason: "source amount overflow".to_string(),
            })?;
        let gas_price = U256::from(receipt.gas_price);
        let record = TradeRecord {
            tx_hash: trade.tx_hash,
            block_number: trade.block_number,
            log_index: trade.log_index,
            timestamp,
            sender: receipt.from,
            src_amount,
            gas_used: receipt.gas_used,
            gas_price,
            transaction_fee: U256::from(receipt.gas_used) * gas_price,
            volume_excluded,
            trade: trade.event,
        };
        debug!(
            tx_hash = %record.tx_hash,
            log_index = record.log_index,
            fee = %record.transaction_fee,
            "Gathered trade"
        );
        Ok(record)
    }
}
