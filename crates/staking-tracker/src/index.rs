//! The [`BtcDelegationIndex`] maps the transactions that can spend a staking output back to the
//! delegation they belong to.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use bitcoin::Txid;
use vigilante_primitives::delegation::{SlashingPath, TrackedDelegation};

#[derive(Debug, Default)]
struct Maps {
    delegations: HashMap<Txid, TrackedDelegation>,
    slashing: HashMap<Txid, Txid>,
    unbonding_slashing: HashMap<Txid, Txid>,
}

/// Delegations known to the atomic slasher, indexed by staking, slashing and unbonding slashing
/// transaction hash.
///
/// The three maps are only ever updated together, under a single lock.
#[derive(Debug, Default)]
pub struct BtcDelegationIndex {
    maps: Mutex<Maps>,
}

impl BtcDelegationIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    fn maps(&self) -> MutexGuard<'_, Maps> {
        // No method panics while holding the lock, the maps are consistent even after a poison.
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tracks `del`. Returns `false`, leaving the index untouched, if the delegation is already
    /// tracked.
    pub fn add(&self, del: TrackedDelegation) -> bool {
        let mut maps = self.maps();
        if maps.delegations.contains_key(&del.staking_tx_hash) {
            return false;
        }

        maps.slashing
            .insert(del.slashing_tx_hash, del.staking_tx_hash);
        maps.unbonding_slashing
            .insert(del.unbonding_slashing_tx_hash, del.staking_tx_hash);
        maps.delegations.insert(del.staking_tx_hash, del);

        true
    }

    /// Stops tracking the delegation, returning it if it was tracked.
    pub fn remove(&self, staking_tx_hash: &Txid) -> Option<TrackedDelegation> {
        let mut maps = self.maps();
        let del = maps.delegations.remove(staking_tx_hash)?;
        maps.slashing.remove(&del.slashing_tx_hash);
        maps.unbonding_slashing
            .remove(&del.unbonding_slashing_tx_hash);

        Some(del)
    }

    /// The tracked delegation with the given staking transaction hash.
    pub fn get(&self, staking_tx_hash: &Txid) -> Option<TrackedDelegation> {
        self.maps().delegations.get(staking_tx_hash).cloned()
    }

    /// The delegation `txid` slashes, and through which output.
    pub fn find_by_spend(&self, txid: &Txid) -> Option<(TrackedDelegation, SlashingPath)> {
        let maps = self.maps();
        let (staking_tx_hash, path) = match maps.slashing.get(txid) {
            Some(hash) => (hash, SlashingPath::Staking),
            None => (maps.unbonding_slashing.get(txid)?, SlashingPath::Unbonding),
        };

        maps.delegations
            .get(staking_tx_hash)
            .map(|del| (del.clone(), path))
    }

    /// Number of tracked delegations.
    pub fn len(&self) -> usize {
        self.maps().delegations.len()
    }

    /// Whether no delegation is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
