//! BTC delegations as stored on the App chain and the subset the tracker keeps in memory.

use std::fmt;

use bitcoin::{
    secp256k1::schnorr::Signature, Amount, OutPoint, ScriptBuf, Transaction, TxOut, Txid,
    XOnlyPublicKey,
};
use serde::{Deserialize, Serialize};

use crate::{
    adaptor::AdaptorSignature,
    errors::{DecodeError, ScriptError},
    params::StakingParams,
    scripts::{StakingOutput, UnbondingOutput},
};

/// Lifecycle of a delegation as seen from a given Bitcoin height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DelegationStatus {
    /// Waiting for inclusion or for covenant signatures.
    Pending,

    /// Has voting power.
    Active,

    /// The staker unbonded early.
    Unbonded,

    /// The timelock is about to end or has ended.
    Expired,

    /// Query-only wildcard.
    Any,
}

impl DelegationStatus {
    /// The name used in App-chain queries.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Unbonded => "UNBONDED",
            Self::Expired => "EXPIRED",
            Self::Any => "ANY",
        }
    }
}

impl fmt::Display for DelegationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which output a slashing transaction spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlashingPath {
    /// The staking output.
    Staking,

    /// Output 0 of the unbonding transaction.
    Unbonding,
}

/// A covenant member's adaptor signatures over a slashing transaction, one per finality provider
/// of the delegation, in the delegation's provider order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CovenantAdaptorSignatures {
    /// The covenant member.
    pub cov_pk: XOnlyPublicKey,

    /// `adaptor_sigs[i]` is encrypted under the i-th finality provider key of the delegation.
    pub adaptor_sigs: Vec<AdaptorSignature>,
}

/// A covenant member's signature over the unbonding transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CovenantUnbondingSignature {
    /// The covenant member.
    pub cov_pk: XOnlyPublicKey,

    /// BIP340 signature over the unbonding transaction.
    pub sig: Signature,
}

/// The unbonding half of a delegation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcUndelegation {
    /// Spends the staking output into the unbonding output.
    pub unbonding_tx: Transaction,

    /// Spends the unbonding output to the slashing address.
    pub slashing_tx: Transaction,

    /// Set once the staker has unbonded early.
    pub delegator_unbonding_sig: Option<Signature>,

    /// Staker signature over `slashing_tx`.
    pub delegator_slashing_sig: Signature,

    /// Covenant adaptor signatures over `slashing_tx`.
    pub covenant_slashing_sigs: Vec<CovenantAdaptorSignatures>,

    /// Covenant signatures over `unbonding_tx`.
    pub covenant_unbonding_sigs: Vec<CovenantUnbondingSignature>,
}

/// A BTC delegation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcDelegation {
    /// Key of the staker.
    pub staker_pk: XOnlyPublicKey,

    /// Finality providers the stake is delegated to.
    pub fp_pks: Vec<XOnlyPublicKey>,

    /// Relative timelock of the staking output.
    pub staking_time: u16,

    /// Bitcoin height from which the delegation counts.
    pub start_height: u32,

    /// Bitcoin height at which the timelock ends.
    pub end_height: u32,

    /// Staked amount.
    pub total_sat: Amount,

    /// The staking transaction.
    pub staking_tx: Transaction,

    /// Index of the staking output in `staking_tx`.
    pub staking_output_idx: u32,

    /// Spends the staking output to the slashing address.
    pub slashing_tx: Transaction,

    /// Staker signature over `slashing_tx`.
    pub delegator_slashing_sig: Signature,

    /// Covenant adaptor signatures over `slashing_tx`.
    pub covenant_sigs: Vec<CovenantAdaptorSignatures>,

    /// Relative timelock of the unbonding output.
    pub unbonding_time: u16,

    /// The unbonding data.
    pub btc_undelegation: BtcUndelegation,

    /// Version of the staking parameters the delegation was created under.
    pub params_version: u32,
}

impl BtcDelegation {
    /// Identifier of the delegation.
    pub fn staking_tx_hash(&self) -> Txid {
        self.staking_tx.compute_txid()
    }

    /// The output locked by the staking transaction.
    pub fn staking_outpoint(&self) -> OutPoint {
        OutPoint::new(self.staking_tx_hash(), self.staking_output_idx)
    }

    /// Output 0 of the unbonding transaction.
    pub fn unbonding_outpoint(&self) -> OutPoint {
        OutPoint::new(self.btc_undelegation.unbonding_tx.compute_txid(), 0)
    }

    /// The staking output as recorded in the staking transaction.
    pub fn staking_tx_out(&self) -> Result<&TxOut, DecodeError> {
        self.staking_tx
            .output
            .get(self.staking_output_idx as usize)
            .ok_or_else(|| DecodeError::invalid("staking_output_idx", "out of range"))
    }

    /// The unbonding output as recorded in the unbonding transaction.
    pub fn unbonding_tx_out(&self) -> Result<&TxOut, DecodeError> {
        self.btc_undelegation
            .unbonding_tx
            .output
            .first()
            .ok_or_else(|| DecodeError::invalid("unbonding_tx", "no outputs"))
    }

    /// Rebuilds the staking output from the participants and `params`.
    pub fn staking_output(&self, params: &StakingParams) -> Result<StakingOutput, ScriptError> {
        StakingOutput::new(
            &self.staker_pk,
            &self.fp_pks,
            &params.covenant_pks,
            params.covenant_quorum,
            self.staking_time,
            self.total_sat,
        )
    }

    /// Rebuilds the unbonding output from the participants and `params`.
    pub fn unbonding_output(&self, params: &StakingParams) -> Result<UnbondingOutput, ScriptError> {
        let value = self
            .btc_undelegation
            .unbonding_tx
            .output
            .first()
            .map(|out| out.value)
            .unwrap_or(Amount::ZERO);

        UnbondingOutput::new(
            &self.staker_pk,
            &self.fp_pks,
            &params.covenant_pks,
            params.covenant_quorum,
            self.unbonding_time,
            value,
        )
    }

    /// The slashing transaction for `path`.
    pub const fn slashing_tx(&self, path: SlashingPath) -> &Transaction {
        match path {
            SlashingPath::Staking => &self.slashing_tx,
            SlashingPath::Unbonding => &self.btc_undelegation.slashing_tx,
        }
    }

    /// The staker's signature on the slashing transaction for `path`.
    pub const fn delegator_slashing_sig(&self, path: SlashingPath) -> &Signature {
        match path {
            SlashingPath::Staking => &self.delegator_slashing_sig,
            SlashingPath::Unbonding => &self.btc_undelegation.delegator_slashing_sig,
        }
    }

    /// The covenant adaptor signatures over the slashing transaction for `path`.
    pub fn covenant_adaptor_sigs(&self, path: SlashingPath) -> &[CovenantAdaptorSignatures] {
        match path {
            SlashingPath::Staking => &self.covenant_sigs,
            SlashingPath::Unbonding => &self.btc_undelegation.covenant_slashing_sigs,
        }
    }

    /// Position of `fp_pk` in the delegation's provider list.
    pub fn fp_index(&self, fp_pk: &XOnlyPublicKey) -> Option<usize> {
        self.fp_pks.iter().position(|pk| pk == fp_pk)
    }

    /// Whether the staker submitted its unbonding signature.
    pub const fn is_unbonded_early(&self) -> bool {
        self.btc_undelegation.delegator_unbonding_sig.is_some()
    }

    /// Whether the covenant signed the staking slashing transaction.
    pub fn has_covenant_quorum_on_slashing(&self, quorum: u32) -> bool {
        self.covenant_sigs.len() >= quorum as usize
    }

    /// Whether the covenant signed the unbonding slashing transaction.
    pub fn has_covenant_quorum_on_unbonding_slashing(&self, quorum: u32) -> bool {
        self.btc_undelegation.covenant_slashing_sigs.len() >= quorum as usize
    }

    /// Whether the covenant signed the unbonding transaction.
    pub fn has_covenant_quorum_on_unbonding(&self, quorum: u32) -> bool {
        self.btc_undelegation.covenant_unbonding_sigs.len() >= quorum as usize
    }

    /// Whether every pre-signed transaction carries a covenant quorum.
    pub fn has_covenant_quorums(&self, quorum: u32) -> bool {
        self.has_covenant_quorum_on_slashing(quorum)
            && self.has_covenant_quorum_on_unbonding_slashing(quorum)
            && self.has_covenant_quorum_on_unbonding(quorum)
    }

    /// The status at Bitcoin height `btc_tip`.
    ///
    /// `finalization_timeout` is the number of blocks before `end_height` at which a delegation
    /// loses its voting power.
    pub fn status(
        &self,
        btc_tip: u32,
        finalization_timeout: u32,
        quorum: u32,
    ) -> DelegationStatus {
        if self.is_unbonded_early() {
            return DelegationStatus::Unbonded;
        }

        if btc_tip < self.start_height || !self.has_covenant_quorums(quorum) {
            return DelegationStatus::Pending;
        }

        if btc_tip.saturating_add(finalization_timeout) >= self.end_height {
            return DelegationStatus::Expired;
        }

        DelegationStatus::Active
    }

    /// Whether the unbonding slashing transaction can be used: the staker unbonded and the
    /// covenant signed the unbonding slashing transaction.
    pub fn is_slashable_via_unbonding(&self, quorum: u32) -> bool {
        self.is_unbonded_early() && self.has_covenant_quorum_on_unbonding_slashing(quorum)
    }

    /// The record the tracker keeps for this delegation.
    pub fn tracked(&self) -> Result<TrackedDelegation, DecodeError> {
        Ok(TrackedDelegation {
            staking_tx_hash: self.staking_tx_hash(),
            slashing_tx_hash: self.slashing_tx.compute_txid(),
            unbonding_slashing_tx_hash: self.btc_undelegation.slashing_tx.compute_txid(),
            staking_outpoint: self.staking_outpoint(),
            staking_pk_script: self.staking_tx_out()?.script_pubkey.clone(),
            start_height: self.start_height,
            unbonding_output: self.unbonding_tx_out()?.clone(),
        })
    }
}

/// What the tracker remembers about a delegation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedDelegation {
    /// Identifier of the delegation.
    pub staking_tx_hash: Txid,

    /// Hash of the staking slashing transaction.
    pub slashing_tx_hash: Txid,

    /// Hash of the unbonding slashing transaction.
    pub unbonding_slashing_tx_hash: Txid,

    /// The staking output.
    pub staking_outpoint: OutPoint,

    /// Locking script of the staking output.
    pub staking_pk_script: ScriptBuf,

    /// Bitcoin height from which the delegation counts.
    pub start_height: u32,

    /// Output 0 of the unbonding transaction, used to recognize an unbonding spend.
    pub unbonding_output: TxOut,
}

/// A pre-signed slashing transaction observed in a Bitcoin block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashingTxInfo {
    /// Which output the transaction spends.
    pub path: SlashingPath,

    /// The delegation it slashes.
    pub staking_tx_hash: Txid,

    /// The transaction as mined.
    pub tx: Transaction,
}
