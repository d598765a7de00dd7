use alloy::primitives::{Address, B256, TxHash, U256};
use serde::{Deserialize, Serialize};

use super::{BlockNumber, EventContext, Timestamp};

/// Decoded contract event, independent of the protocol version emitted it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// Single self-contained trade through the network.
    TradeExecuted(TradeExecuted),

    /// Trade fees split between platform, stakers, rebates and burn.
    FeeDistributed(FeeDistribution),

    /// New reserve listed in the storage contract.
    ReserveRegistered(ReserveRegistration),

    /// Rebate wallet of a listed reserve changed.
    RebateWalletUpdated(RebateWalletUpdate),
}

/// Decoded event together with its log position.
pub type DecodedEvent = EventContext<ExchangeEvent>;

/// Trade fields carried by the trade event itself.
///
/// A trade goes token -> ETH -> token, either leg may be empty when
/// one of the sides is ETH. Reserves of each leg are named by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeExecuted {
    pub src_token: Address,
    pub dst_token: Address,
    pub eth_amount: U256,
    pub network_fee: U256,
    pub platform_fee: U256,
    pub t2e_reserves: Vec<B256>,
    pub e2t_reserves: Vec<B256>,
    pub t2e_src_amounts: Vec<U256>,
    pub e2t_src_amounts: Vec<U256>,
    pub t2e_rates: Vec<U256>,
    pub e2t_rates: Vec<U256>,
}

impl TradeExecuted {
    /// Ids of all reserves taking part in the trade.
    pub fn reserves(&self) -> impl Iterator<Item = &B256> {
        self.t2e_reserves.iter().chain(self.e2t_reserves.iter())
    }

    /// Amount of source token traded: sum of the token -> ETH leg, or of
    /// the ETH -> token leg when the source is ETH. `None` on overflow.
    pub fn src_amount(&self) -> Option<U256> {
        let leg = if self.t2e_reserves.is_empty() {
            &self.e2t_src_amounts
        } else {
            &self.t2e_src_amounts
        };
        leg.iter()
            .try_fold(U256::ZERO, |acc, amount| acc.checked_add(*amount))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDistribution {
    pub token: Address,
    pub platform_wallet: Address,
    pub platform_fee: U256,
    pub reward: U256,
    pub rebate: U256,
    pub rebate_wallets: Vec<Address>,
    pub rebate_percent_bps: Vec<U256>,
    pub burn_amount: U256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRegistration {
    pub reserve_id: B256,
    pub reserve_address: Address,
    pub reserve_type: u8,
    pub rebate_wallet: Address,

    /// `false` when the reserve is being delisted.
    pub add: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebateWalletUpdate {
    pub reserve_id: B256,
    pub rebate_wallet: Address,
}

/// Fully enriched trade, the accounting unit handed to the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub tx_hash: TxHash,
    pub block_number: BlockNumber,
    pub log_index: u64,

    /// Wall-clock time of the block.
    pub timestamp: Timestamp,

    /// Sender of the transaction the trade was executed by.
    pub sender: Address,

    #[serde(flatten)]
    pub trade: TradeExecuted,

    /// Source token amount, see [`TradeExecuted::src_amount`].
    pub src_amount: U256,

    pub gas_used: u64,
    pub gas_price: U256,

    /// `gas_used * gas_price`, in wei.
    pub transaction_fee: U256,

    /// Trade went through a reserve excluded from volume statistics.
    pub volume_excluded: bool,
}

/// Natural key records are upserted by.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Eq, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub tx_hash: TxHash,
    pub log_index: u64,
}

/// Output line of an assembled window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlRecord {
    Trade(TradeRecord),
    FeeDistribution(EventContext<FeeDistribution>),
    ReserveRegistration(EventContext<ReserveRegistration>),
    RebateWalletUpdate(EventContext<RebateWalletUpdate>),
}

impl CrawlRecord {
    pub fn key(&self) -> RecordKey {
        let (tx_hash, log_index) = match self {
            Self::Trade(r) => (r.tx_hash, r.log_index),
            Self::FeeDistribution(c) => (c.tx_hash, c.log_index),
            Self::ReserveRegistration(c) => (c.tx_hash, c.log_index),
            Self::RebateWalletUpdate(c) => (c.tx_hash, c.log_index),
        };
        RecordKey { tx_hash, log_index }
    }

    pub fn block_number(&self) -> BlockNumber {
        match self {
            Self::Trade(r) => r.block_number,
            Self::FeeDistribution(c) => c.block_number,
            Self::ReserveRegistration(c) => c.block_number,
            Self::RebateWalletUpdate(c) => c.block_number,
        }
    }

    pub fn as_trade(&self) -> Option<&TradeRecord> {
        match self {
            Self::Trade(r) => Some(r),
            _ => None,
        }
    }
}
