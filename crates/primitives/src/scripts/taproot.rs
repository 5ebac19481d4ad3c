//! Taproot outputs committing to the staking leaves.
//!
//! Both outputs use an unspendable internal key so that they can only be spent through one of
//! their leaves.

use std::sync::LazyLock;

use bitcoin::{
    taproot::{ControlBlock, LeafVersion, TaprootBuilder, TaprootSpendInfo},
    Amount, ScriptBuf, TxOut, XOnlyPublicKey,
};
use secp256k1::SECP256K1;

use super::staking::{time_lock_script, StakingScripts};
use crate::errors::ScriptError;

/// x coordinate of `H = lift_x(sha256(G))`, the BIP341 nothing-up-my-sleeve point.
const UNSPENDABLE_KEY_BYTES: [u8; 32] = [
    0x50, 0x92, 0x9b, 0x74, 0xc1, 0xa0, 0x49, 0x54, 0xb7, 0x8b, 0x4b, 0x60, 0x35, 0xe9, 0x7a, 0x5e,
    0x07, 0x8a, 0x5a, 0x0f, 0x28, 0xec, 0x96, 0xd5, 0x47, 0xbf, 0xee, 0x9a, 0xce, 0x80, 0x3a, 0xc0,
];

/// The internal key of every staking and unbonding output.
pub static UNSPENDABLE_INTERNAL_KEY: LazyLock<XOnlyPublicKey> = LazyLock::new(|| {
    XOnlyPublicKey::from_slice(&UNSPENDABLE_KEY_BYTES).expect("valid xonly public key")
});

/// A tapscript leaf together with the proof of its inclusion in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSpend {
    /// The leaf script.
    pub script: ScriptBuf,

    /// The control block for `script`.
    pub control_block: ControlBlock,
}

/// Builds the spend info for leaves given as `(depth, script)`.
fn build_spend_info(leaves: &[(u8, &ScriptBuf)]) -> Result<TaprootSpendInfo, ScriptError> {
    let mut builder = TaprootBuilder::new();
    for (depth, script) in leaves {
        builder = builder
            .add_leaf(*depth, (*script).clone())
            .map_err(|e| ScriptError::Taproot(e.to_string()))?;
    }

    builder
        .finalize(SECP256K1, *UNSPENDABLE_INTERNAL_KEY)
        .map_err(|_| ScriptError::Taproot("incomplete tree".to_string()))
}

fn leaf_spend(spend_info: &TaprootSpendInfo, script: &ScriptBuf) -> Result<LeafSpend, ScriptError> {
    let control_block = spend_info
        .control_block(&(script.clone(), LeafVersion::TapScript))
        .ok_or(ScriptError::MissingControlBlock)?;

    Ok(LeafSpend {
        script: script.clone(),
        control_block,
    })
}

fn p2tr_script(spend_info: &TaprootSpendInfo) -> ScriptBuf {
    ScriptBuf::new_p2tr(
        SECP256K1,
        spend_info.internal_key(),
        spend_info.merkle_root(),
    )
}

/// The output locked by a staking transaction.
#[derive(Debug, Clone)]
pub struct StakingOutput {
    scripts: StakingScripts,
    spend_info: TaprootSpendInfo,
    value: Amount,
}

impl StakingOutput {
    /// Builds the staking output of `value` for the given participants.
    pub fn new(
        staker: &XOnlyPublicKey,
        fp_keys: &[XOnlyPublicKey],
        covenant_keys: &[XOnlyPublicKey],
        covenant_quorum: u32,
        staking_time: u16,
        value: Amount,
    ) -> Result<Self, ScriptError> {
        let scripts =
            StakingScripts::new(staker, fp_keys, covenant_keys, covenant_quorum, staking_time)?;
        let spend_info = build_spend_info(&[
            (2, &scripts.time_lock),
            (2, &scripts.unbonding),
            (1, &scripts.slashing),
        ])?;

        Ok(Self {
            scripts,
            spend_info,
            value,
        })
    }

    /// The leaves of this output.
    pub const fn scripts(&self) -> &StakingScripts {
        &self.scripts
    }

    /// The `OP_1 <output key>` locking script.
    pub fn pk_script(&self) -> ScriptBuf {
        p2tr_script(&self.spend_info)
    }

    /// The output as it appears in the staking transaction.
    pub fn tx_out(&self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.pk_script(),
        }
    }

    /// The slashing leaf and its control block.
    pub fn slashing_path(&self) -> Result<LeafSpend, ScriptError> {
        leaf_spend(&self.spend_info, &self.scripts.slashing)
    }

    /// The unbonding leaf and its control block.
    pub fn unbonding_path(&self) -> Result<LeafSpend, ScriptError> {
        leaf_spend(&self.spend_info, &self.scripts.unbonding)
    }
}

/// Output 0 of an unbonding transaction.
///
/// It carries the same slashing leaf as the staking output but replaces the unbonding leaf with
/// nothing and the staking timelock with the unbonding timelock.
#[derive(Debug, Clone)]
pub struct UnbondingOutput {
    time_lock: ScriptBuf,
    slashing: ScriptBuf,
    spend_info: TaprootSpendInfo,
    value: Amount,
}

impl UnbondingOutput {
    /// Builds the unbonding output of `value` for the given participants.
    pub fn new(
        staker: &XOnlyPublicKey,
        fp_keys: &[XOnlyPublicKey],
        covenant_keys: &[XOnlyPublicKey],
        covenant_quorum: u32,
        unbonding_time: u16,
        value: Amount,
    ) -> Result<Self, ScriptError> {
        let scripts =
            StakingScripts::new(staker, fp_keys, covenant_keys, covenant_quorum, unbonding_time)?;
        let time_lock = time_lock_script(staker, unbonding_time);
        let spend_info = build_spend_info(&[(1, &time_lock), (1, &scripts.slashing)])?;

        Ok(Self {
            time_lock,
            slashing: scripts.slashing,
            spend_info,
            value,
        })
    }

    /// The timelock leaf.
    pub const fn time_lock_script(&self) -> &ScriptBuf {
        &self.time_lock
    }

    /// The `OP_1 <output key>` locking script.
    pub fn pk_script(&self) -> ScriptBuf {
        p2tr_script(&self.spend_info)
    }

    /// The output as it appears in the unbonding transaction.
    pub fn tx_out(&self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.pk_script(),
        }
    }

    /// The slashing leaf and its control block.
    pub fn slashing_path(&self) -> Result<LeafSpend, ScriptError> {
        leaf_spend(&self.spend_info, &self.slashing)
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{hashes::Hash, TapLeafHash};

    use super::*;
    use crate::test_utils::generate_keys;

    fn participants() -> (XOnlyPublicKey, Vec<XOnlyPublicKey>, Vec<XOnlyPublicKey>) {
        let (_, keys) = generate_keys(7);
        (keys[0], keys[1..3].to_vec(), keys[3..].to_vec())
    }

    #[test]
    fn unspendable_key_is_valid() {
        assert_eq!(UNSPENDABLE_INTERNAL_KEY.serialize(), UNSPENDABLE_KEY_BYTES);
    }

    #[test]
    fn control_blocks_verify_against_the_output_key() {
        let (staker, fps, covenants) = participants();
        let output =
            StakingOutput::new(&staker, &fps, &covenants, 3, 1000, Amount::from_sat(50_000))
                .unwrap();

        let pk_script = output.pk_script();
        assert!(pk_script.is_p2tr());

        let output_key = output.spend_info.output_key().to_inner();
        for leaf in [output.slashing_path().unwrap(), output.unbonding_path().unwrap()] {
            assert!(leaf
                .control_block
                .verify_taproot_commitment(SECP256K1, output_key, &leaf.script));
        }
    }

    #[test]
    fn staking_and_unbonding_share_the_slashing_leaf() {
        let (staker, fps, covenants) = participants();
        let staking =
            StakingOutput::new(&staker, &fps, &covenants, 3, 1000, Amount::from_sat(50_000))
                .unwrap();
        let unbonding =
            UnbondingOutput::new(&staker, &fps, &covenants, 3, 100, Amount::from_sat(49_000))
                .unwrap();

        let staking_leaf = staking.slashing_path().unwrap();
        let unbonding_leaf = unbonding.slashing_path().unwrap();
        assert_eq!(
            TapLeafHash::from_script(&staking_leaf.script, LeafVersion::TapScript).to_byte_array(),
            TapLeafHash::from_script(&unbonding_leaf.script, LeafVersion::TapScript)
                .to_byte_array()
        );
        assert_ne!(staking.pk_script(), unbonding.pk_script());
        assert_eq!(unbonding.tx_out().value, Amount::from_sat(49_000));
    }
}
