//! BTC staking module parameters.

use bitcoin::{Amount, ScriptBuf, XOnlyPublicKey};

/// The subset of the App chain's BTC staking parameters the tracker works with.
///
/// Parameters are versioned; a delegation is always evaluated under the version it was created
/// with.
#[derive(Debug, Clone, PartialEq)]
pub struct StakingParams {
    /// Version of these parameters.
    pub version: u32,

    /// Public keys of the covenant committee.
    pub covenant_pks: Vec<XOnlyPublicKey>,

    /// Number of covenant signatures needed on every pre-signed transaction.
    pub covenant_quorum: u32,

    /// Fraction of the stake sent to the slashing address.
    pub slashing_rate: f64,

    /// Locking script receiving slashed funds.
    pub slashing_pk_script: ScriptBuf,

    /// Minimum fee of a slashing transaction.
    pub min_slashing_tx_fee: Amount,

    /// Fee of the unbonding transaction.
    pub unbonding_fee: Amount,

    /// Number of Bitcoin blocks before the end of the timelock at which a delegation stops
    /// having voting power.
    pub finalization_timeout: u32,
}

impl StakingParams {
    /// Whether `count` signatures reach the covenant quorum.
    pub const fn is_quorum(&self, count: usize) -> bool {
        count >= self.covenant_quorum as usize
    }
}
