//! In-memory chain and log builders for testing.
//!
//! [`MockChain`] implements [`ChainSource`] over logs, receipts and block
//! timestamps inserted by the test, and can simulate provider result limits,
//! slow responses and transient failures. Every query is counted so tests can
//! assert on the number of chain round trips.
//!
//! Free functions build Katalyst event logs with deterministic addresses and
//! hashes derived from small integers.
//!

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use alloy::primitives::{Address, B256, TxHash, U256, address};
use alloy_sol_types::SolEvent;

use crate::{
    abi::katalyst,
    error::CrawlError,
    retry::RetryPolicy,
    source::{ChainSource, TxReceipt},
    types::{BlockNumber, BlockWindow, RawLogEntry, Timestamp},
};

/// Address all builder logs are emitted by.
pub const CONTRACT: Address = address!("0x9aab3f75489902f3a48495025729a0af77d4b11e");

/// Sender of all receipts built with [`receipt`].
pub const SENDER: Address = address!("0x00000000000000000000000000000000000000a1");

#[derive(Debug, Default)]
struct MockState {
    head: BlockNumber,
    logs: Vec<RawLogEntry>,
    receipts: HashMap<TxHash, TxReceipt>,
    timestamps: HashMap<BlockNumber, Timestamp>,
    max_logs_per_query: Option<usize>,
    log_latency_per_block: Duration,
    call_latency: Duration,
}

/// Chain node double with interior mutability, so it can be shared with
/// the crawler and still be mutated by the test.
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<MockState>,
    failures: AtomicU32,
    ignore_topic_filter: AtomicBool,
    head_calls: AtomicU32,
    log_calls: AtomicU32,
    receipt_calls: AtomicU32,
    timestamp_calls: AtomicU32,
}

impl MockChain {
    pub fn new(head: BlockNumber) -> Self {
        let chain = Self::default();
        chain.set_head(head);
        chain
    }

    pub fn set_head(&self, head: BlockNumber) {
        self.state().head = head;
    }

    /// Adds logs, keeping the chain in (block, log index) order.
    pub fn push_logs(&self, logs: impl IntoIterator<Item = RawLogEntry>) {
        let mut state = self.state();
        state.logs.extend(logs);
        state.logs.sort_by_key(RawLogEntry::position);
    }

    /// Marks logs of the block as removed by a reorganization.
    pub fn remove_block_logs(&self, block: BlockNumber) {
        self.state()
            .logs
            .iter_mut()
            .filter(|log| log.block_number == block)
            .for_each(|log| log.removed = true);
    }

    /// Log queries matching more entries fail with [`CrawlError::RangeTooLarge`].
    pub fn set_max_logs_per_query(&self, max: usize) {
        self.state().max_logs_per_query = Some(max);
    }

    /// Log queries take this long per block in the queried range.
    pub fn set_log_latency_per_block(&self, latency: Duration) {
        self.state().log_latency_per_block = latency;
    }

    /// Receipt and block queries take this long.
    pub fn set_call_latency(&self, latency: Duration) {
        self.state().call_latency = latency;
    }

    /// Next `n` queries of any kind fail with a transport error.
    pub fn fail_next_calls(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Returns logs regardless of their first topic, like a node serving
    /// events the crawler has no decoder for.
    pub fn ignore_topic_filter(&self) {
        self.ignore_topic_filter.store(true, Ordering::SeqCst);
    }

    pub fn insert_receipt(&self, tx_hash: TxHash, receipt: TxReceipt) {
        self.state().receipts.insert(tx_hash, receipt);
    }

    pub fn insert_timestamp(&self, block: BlockNumber, timestamp: Timestamp) {
        self.state().timestamps.insert(block, timestamp);
    }

    pub fn head_calls(&self) -> u32 {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn log_calls(&self) -> u32 {
        self.log_calls.load(Ordering::SeqCst)
    }

    pub fn receipt_calls(&self) -> u32 {
        self.receipt_calls.load(Ordering::SeqCst)
    }

    pub fn timestamp_calls(&self) -> u32 {
        self.timestamp_calls.load(Ordering::SeqCst)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        // Poisoned only if a test already panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn call(&self, counter: &AtomicU32) -> Result<(), CrawlError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CrawlError::Transport("injected failure".to_string()));
        }
        Ok(())
    }
}

impl ChainSource for MockChain {
    async fn head_block(&self) -> Result<BlockNumber, CrawlError> {
        self.call(&self.head_calls)?;
        Ok(self.state().head)
    }

    async fn logs(
        &self,
        addresses: &[Address],
        signatures: &[B256],
        window: BlockWindow,
    ) -> Result<Vec<RawLogEntry>, CrawlError> {
        self.call(&self.log_calls)?;
        let ignore_topics = self.ignore_topic_filter.load(Ordering::SeqCst);
        let (logs, latency) = {
            let state = self.state();
            let logs = state
                .logs
                .iter()
                .filter(|log| {
                    (window.from()..=window.to()).contains(&log.block_number)
                        && addresses.contains(&log.address)
                        && (ignore_topics
                            || log.signature().is_some_and(|s| signatures.contains(&s)))
                })
                .cloned()
                .collect::<Vec<_>>();
            if let Some(max) = state.max_logs_per_query.filter(|max| logs.len() > *max) {
                return Err(CrawlError::RangeTooLarge(format!(
                    "query returned more than {max} results"
                )));
            }
            let blocks = u32::try_from(window.len()).unwrap_or(u32::MAX);
            (logs, state.log_latency_per_block.saturating_mul(blocks))
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(logs)
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, CrawlError> {
        self.call(&self.receipt_calls)?;
        let (receipt, latency) = {
            let state = self.state();
            (state.receipts.get(&tx_hash).copied(), state.call_latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(receipt)
    }

    async fn block_timestamp(&self, block: BlockNumber) -> Result<Option<Timestamp>, CrawlError> {
        self.call(&self.timestamp_calls)?;
        let (timestamp, latency) = {
            let state = self.state();
            (state.timestamps.get(&block).copied(), state.call_latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(timestamp)
    }
}

/// Fast retries and a 50ms call deadline.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(
        3,
        Duration::from_millis(1),
        Duration::from_millis(2),
        Duration::from_millis(50),
    )
}

pub fn tx(n: u8) -> TxHash {
    TxHash::with_last_byte(n)
}

pub fn token(n: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0x70;
    bytes[19] = n;
    Address::from(bytes)
}

pub fn reserve_id(n: u8) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xaa;
    bytes[31] = n;
    B256::from(bytes)
}

pub fn reserve_address(n: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0x5e;
    bytes[19] = n;
    Address::from(bytes)
}

/// Successful receipt sent by [`SENDER`].
pub fn receipt(gas_used: u64, gas_price: u128) -> TxReceipt {
    TxReceipt {
        from: SENDER,
        gas_used,
        gas_price,
        status: true,
    }
}

/// Token to ETH trade through reserve 1 of `eth_amount` wei.
pub fn trade(src: u8, dst: u8, eth_amount: u64) -> katalyst::KyberTrade {
    katalyst::KyberTrade {
        src: token(src),
        dest: token(dst),
        ethWeiValue: U256::from(eth_amount),
        networkFeeWei: U256::from(eth_amount / 1000),
        customPlatformFeeWei: U256::ZERO,
        t2eIds: vec![reserve_id(1)],
        e2tIds: vec![],
        t2eSrcAmounts: vec![U256::from(eth_amount)],
        e2tSrcAmounts: vec![],
        t2eRates: vec![U256::from(10).pow(U256::from(18))],
        e2tRates: vec![],
    }
}

/// Log of the event emitted by [`CONTRACT`].
pub fn raw_log<E: SolEvent>(
    block_number: BlockNumber,
    log_index: u64,
    tx_hash: TxHash,
    event: &E,
) -> RawLogEntry {
    let data = event.encode_log_data();
    RawLogEntry {
        address: CONTRACT,
        topics: data.topics().to_vec(),
        data: data.data,
        block_number,
        tx_hash,
        log_index,
        removed: false,
    }
}

pub fn trade_log(
    block_number: BlockNumber,
    log_index: u64,
    tx_hash: TxHash,
    trade: katalyst::KyberTrade,
) -> RawLogEntry {
    raw_log(block_number, log_index, tx_hash, &trade)
}

pub fn fee_log(
    block_number: BlockNumber,
    log_index: u64,
    tx_hash: TxHash,
    platform_fee: u64,
) -> RawLogEntry {
    let event = katalyst::FeeDistributed {
        token: token(0),
        platformWallet: Address::with_last_byte(0xfe),
        platformFeeWei: U256::from(platform_fee),
        rewardWei: U256::from(1),
        rebateWei: U256::from(2),
        rebateWallets: vec![Address::with_last_byte(0xaa)],
        rebatePercentBpsPerWallet: vec![U256::from(10_000)],
        burnAmtWei: U256::from(3),
    };
    raw_log(block_number, log_index, tx_hash, &event)
}

/// Registration of reserve `n` with [`reserve_address`] and [`reserve_id`].
pub fn reserve_added_log(
    block_number: BlockNumber,
    log_index: u64,
    tx_hash: TxHash,
    n: u8,
    rebate_wallet: Address,
) -> RawLogEntry {
    let event = katalyst::AddReserveToStorage {
        reserve: reserve_address(n),
        reserveId: reserve_id(n),
        reserveType: 1,
        rebateWallet: rebate_wallet,
        add: true,
    };
    raw_log(block_number, log_index, tx_hash, &event)
}

pub fn rebate_wallet_log(
    block_number: BlockNumber,
    log_index: u64,
    tx_hash: TxHash,
    n: u8,
    rebate_wallet: Address,
) -> RawLogEntry {
    let event = katalyst::ReserveRebateWalletSet {
        reserveId: reserve_id(n),
        rebateWallet: rebate_wallet,
    };
    raw_log(block_number, log_index, tx_hash, &event)
}
