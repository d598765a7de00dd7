//! Event signature -> typed decoder mapping.
//!
//! Every supported protocol version contributes a set of bindings from the
//! first log topic (event signature hash) to a decode function. Supporting
//! a new version means registering its bindings, the assembler stays intact.

use std::collections::HashMap;

use alloy::primitives::B256;
use alloy_sol_types::SolEvent;
use itertools::Itertools;

use crate::{
    abi::katalyst,
    error::CrawlError,
    types::{
        DecodedEvent, EventContext, ExchangeEvent, FeeDistribution, RawLogEntry,
        RebateWalletUpdate, ReserveRegistration, TradeExecuted,
    },
};

/// Decodes a raw log already known to carry the bound signature.
pub type Decoder = fn(&RawLogEntry) -> Result<ExchangeEvent, alloy_sol_types::Error>;

/// Registry of known event signatures.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<B256, Decoder>,
}

impl DecoderRegistry {
    /// Empty registry, every log fails to decode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all events of the Katalyst (v4) contracts.
    pub fn katalyst() -> Self {
        Self::new()
            .with(katalyst::KyberTrade::SIGNATURE_HASH, decode_kyber_trade)
            .with(katalyst::FeeDistributed::SIGNATURE_HASH, decode_fee_distributed)
            .with(
                katalyst::AddReserveToStorage::SIGNATURE_HASH,
                decode_add_reserve_to_storage,
            )
            .with(
                katalyst::ReserveRebateWalletSet::SIGNATURE_HASH,
                decode_reserve_rebate_wallet_set,
            )
    }

    /// Binds the signature to the decoder, replacing the previous binding.
    pub fn register(&mut self, signature: B256, decoder: Decoder) -> Option<Decoder> {
        self.decoders.insert(signature, decoder)
    }

    pub fn with(mut self, signature: B256, decoder: Decoder) -> Self {
        self.register(signature, decoder);
        self
    }

    pub fn contains(&self, signature: &B256) -> bool {
        self.decoders.contains_key(signature)
    }

    /// Known signatures, in stable order, to filter logs by the first topic.
    pub fn signatures(&self) -> Vec<B256> {
        self.decoders.keys().copied().sorted().collect()
    }

    pub fn decode(&self, log: &RawLogEntry) -> Result<DecodedEvent, CrawlError> {
        let decoder = log
            .signature()
            .and_then(|sig| self.decoders.get(&sig))
            .ok_or(CrawlError::UnknownEventTopic {
                topic: log.signature(),
                tx_hash: log.tx_hash,
                log_index: log.log_index,
            })?;
        let event = decoder(log).map_err(|err| CrawlError::MalformedEvent {
            tx_hash: log.tx_hash,
            log_index: log.log_index,
            reason: err.to_string(),
        })?;
        Ok(EventContext::new(
            log.block_number,
            log.tx_hash,
            log.log_index,
            event,
        ))
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.signatures()).finish()
    }
}

fn decode_kyber_trade(log: &RawLogEntry) -> Result<ExchangeEvent, alloy_sol_types::Error> {
    let e = katalyst::KyberTrade::decode_log_data(&log.log_data())?;
    Ok(ExchangeEvent::TradeExecuted(TradeExecuted {
        src_token: e.src,
        dst_token: e.dest,
        eth_amount: e.ethWeiValue,
        network_fee: e.networkFeeWei,
        platform_fee: e.customPlatformFeeWei,
        t2e_reserves: e.t2eIds,
        e2t_reserves: e.e2tIds,
        t2e_src_amounts: e.t2eSrcAmounts,
        e2t_src_amounts: e.e2tSrcAmounts,
        t2e_rates: e.t2eRates,
        e2t_rates: e.e2tRates,
    }))
}

fn decode_fee_distributed(log: &RawLogEntry) -> Result<ExchangeEvent, alloy_sol_types::Error> {
    let e = katalyst::FeeDistributed::decode_log_data(&log.log_data())?;
    Ok(ExchangeEvent::FeeDistributed(FeeDistribution {
        token: e.token,
        platform_wallet: e.platformWallet,
        platform_fee: e.platformFeeWei,
        reward: e.rewardWei,
        rebate: e.rebateWei,
        rebate_wallets: e.rebateWallets,
        rebate_percent_bps: e.rebatePercentBpsPerWallet,
        burn_amount: e.burnAmtWei,
    }))
}

fn decode_add_reserve_to_storage(
    log: &RawLogEntry,
) -> Result<ExchangeEvent, alloy_sol_types::Error> {
    let e = katalyst::AddReserveToStorage::decode_log_data(&log.log_data())?;
    Ok(ExchangeEvent::ReserveRegistered(ReserveRegistration {
        reserve_id: e.reserveId,
        reserve_address: e.reserve,
        reserve_type: e.reserveType,
        rebate_wallet: e.rebateWallet,
        add: e.add,
    }))
}

fn decode_reserve_rebate_wallet_set(
    log: &RawLogEntry,
) -> Result<ExchangeEvent, alloy_sol_types::Error> {
    let e = katalyst::ReserveRebateWalletSet::decode_log_data(&log.log_data())?;
    Ok(ExchangeEvent::RebateWalletUpdated(RebateWalletUpdate {
        reserve_id: e.reserveId,
        rebate_wallet: e.rebateWallet,
    }))
}
