//! Trade-log crawler for Katalyst (Kyber v4) exchange deployments.
//!
//! # Overview
//!
//! Incrementally reads exchange contract logs in confirmed block windows,
//! decodes them into typed events and assembles trade records enriched with
//! transaction receipts and block timestamps.
//!
//! Use [`crawler::Crawler`] with a [`source::ChainSource`] (e.g.
//! [`source::RpcChain`] over an alloy provider) and a [`store::TradeStore`]
//! to crawl a [`Deployment`]. Each window is committed to the store together
//! with the new checkpoint and reserve registry state, so a restarted
//! crawler resumes where the last committed window ended.
//!
//! # Limitations/follow-ups
//!
//! * Only Katalyst events are decoded out of the box, other protocol
//!   versions need their decoders registered with
//!   [`decoder::DecoderRegistry::register`].
//!
//! * Reorgs deeper than the confirmation lag are not detected.
//!
//! # Testing
//!
//! [`testing`] module provides an in-memory chain double and event log
//! builders.
//!

pub mod abi;
pub mod assembler;
pub mod crawler;
pub mod decoder;
pub mod error;
pub mod fetch;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod testing;
pub mod types;

use alloy::primitives::Address;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Exchange contracts being crawled.
pub struct Deployment {
    contracts: Vec<Address>,
    deployed_at_block: u64,
}

impl Deployment {
    pub fn new(contracts: Vec<Address>, deployed_at_block: u64) -> Self {
        Self {
            contracts,
            deployed_at_block,
        }
    }

    pub fn contracts(&self) -> &[Address] {
        &self.contracts
    }

    pub fn deployed_at_block(&self) -> u64 {
        self.deployed_at_block
    }
}
