//! Reserve registry state rebuilt from storage contract events.

use std::collections::{HashMap, HashSet};

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{RebateWalletUpdate, ReserveRegistration};

/// Known attributes of a listed reserve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveEntry {
    /// `None` if only a rebate wallet update was observed for the reserve.
    pub reserve_address: Option<Address>,
    pub rebate_wallet: Address,
}

/// Reserve id -> reserve attributes.
///
/// Owned by a single crawler, mutated only by the sequential assembler pass
/// and loaded from/persisted to the store together with window batches.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRegistry {
    reserves: HashMap<B256, ReserveEntry>,
}

impl ReserveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, reserve_id: &B256) -> Option<&ReserveEntry> {
        self.reserves.get(reserve_id)
    }

    pub fn reserve_address(&self, reserve_id: &B256) -> Option<Address> {
        self.reserves.get(reserve_id).and_then(|r| r.reserve_address)
    }

    pub fn len(&self) -> usize {
        self.reserves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserves.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&B256, &ReserveEntry)> {
        self.reserves.iter()
    }

    /// Lists the reserve, or drops it when the event delists it.
    pub fn apply_registration(&mut self, e: &ReserveRegistration) {
        if !e.add {
            match self.reserves.remove(&e.reserve_id) {
                Some(_) => {
                    debug!(reserve_id = %e.reserve_id, reserve = %e.reserve_address, "Reserve delisted");
                }
                None => warn!(reserve_id = %e.reserve_id, "Unknown reserve delisted"),
            }
            return;
        }
        debug!(reserve_id = %e.reserve_id, reserve = %e.reserve_address, "Reserve registered");
        self.reserves.insert(
            e.reserve_id,
            ReserveEntry {
                reserve_address: Some(e.reserve_address),
                rebate_wallet: e.rebate_wallet,
            },
        );
    }

    pub fn apply_rebate_wallet(&mut self, e: &RebateWalletUpdate) {
        match self.reserves.get_mut(&e.reserve_id) {
            Some(entry) => entry.rebate_wallet = e.rebate_wallet,
            None => {
                warn!(reserve_id = %e.reserve_id, "Rebate wallet set for unknown reserve");
                self.reserves.insert(
                    e.reserve_id,
                    ReserveEntry {
                        reserve_address: None,
                        rebate_wallet: e.rebate_wallet,
                    },
                );
            }
        }
    }

    /// Whether any of the reserves resolves to an address in `excluded`.
    /// Reserves with unknown address never match.
    pub fn any_excluded<'a>(
        &self,
        mut reserve_ids: impl Iterator<Item = &'a B256>,
        excluded: &HashSet<Address>,
    ) -> bool {
        !excluded.is_empty()
            && reserve_ids.any(|id| {
                self.reserve_address(id)
                    .is_some_and(|addr| excluded.contains(&addr))
            })
    }
}
