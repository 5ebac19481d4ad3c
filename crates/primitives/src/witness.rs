//! Witness of a slashing transaction.
//!
//! The slashing leaf consumes signatures from the top of the stack in script order: the staker
//! first, then every finality provider key in sorted order, then every covenant key in sorted
//! order. Written bottom to top, the witness is therefore
//!
//! ```text
//! [cov_{n-1} .. cov_0, fp_{m-1} .. fp_0, delegator_sig, slashing_script, control_block]
//! ```
//!
//! where an empty element stands for a key that did not sign.

use std::collections::BTreeMap;

use bitcoin::{
    hashes::Hash,
    key::Keypair,
    secp256k1::{schnorr::Signature, Message},
    sighash::{Prevouts, SighashCache},
    taproot::LeafVersion,
    TapLeafHash, TapSighashType, Transaction, TxOut, Witness, XOnlyPublicKey,
};
use secp256k1::{SecretKey, SECP256K1};

use crate::{
    delegation::CovenantAdaptorSignatures,
    errors::WitnessError,
    scripts::taproot::LeafSpend,
    secp::{pk_hex, sorted_keys},
};

/// Number of trailing witness elements after the signature slots.
const TRAILING_ELEMENTS: usize = 3;

/// The tapscript sighash (`SIGHASH_DEFAULT`) of input 0 of `tx` spending `prevout` via `leaf`.
pub fn slashing_sighash(
    tx: &Transaction,
    prevout: &TxOut,
    leaf: &LeafSpend,
) -> Result<[u8; 32], WitnessError> {
    let leaf_hash = TapLeafHash::from_script(&leaf.script, LeafVersion::TapScript);
    let prevouts = [prevout];

    let sighash = SighashCache::new(tx)
        .taproot_script_spend_signature_hash(
            0,
            &Prevouts::All(&prevouts),
            leaf_hash,
            TapSighashType::Default,
        )
        .map_err(|e| WitnessError::Sighash(e.to_string()))?;

    Ok(sighash.to_byte_array())
}

/// Signs a slashing sighash.
pub fn sign_slashing_tx(sighash: &[u8; 32], sk: &SecretKey) -> Signature {
    let keypair = Keypair::from_secret_key(SECP256K1, sk);
    SECP256K1.sign_schnorr_no_aux_rand(&Message::from_digest(*sighash), &keypair)
}

/// Inputs to [`build_slashing_witness`].
#[derive(Debug)]
pub struct SlashingWitnessInputs<'a> {
    /// Covenant committee of the delegation's parameters.
    pub covenant_pks: &'a [XOnlyPublicKey],

    /// Number of covenant signatures required by the script.
    pub covenant_quorum: u32,

    /// Covenant adaptor signatures over the slashing transaction.
    pub covenant_adaptor_sigs: &'a [CovenantAdaptorSignatures],

    /// Finality providers of the delegation, in delegation order.
    pub fp_pks: &'a [XOnlyPublicKey],

    /// Staker signature over the slashing transaction.
    pub delegator_sig: &'a Signature,

    /// Slashing leaf and control block of the spent output.
    pub leaf: &'a LeafSpend,
}

/// Assembles a complete slashing witness for the finality provider owning `fp_sk`.
///
/// Covenant signatures are decrypted from the adaptor signatures encrypted under the provider's
/// key. At most `covenant_quorum` of them are included.
pub fn build_slashing_witness(
    inputs: &SlashingWitnessInputs<'_>,
    fp_sk: &SecretKey,
    fp_sig: &Signature,
) -> Result<Witness, WitnessError> {
    let fp_pk = fp_sk.x_only_public_key(SECP256K1).0;
    let fp_del_idx = inputs
        .fp_pks
        .iter()
        .position(|pk| *pk == fp_pk)
        .ok_or(WitnessError::UnknownFinalityProvider)?;

    let mut covenant_slots = Vec::with_capacity(inputs.covenant_pks.len());
    let mut available = 0;
    for cov_pk in sorted_keys(inputs.covenant_pks) {
        let sig = match inputs
            .covenant_adaptor_sigs
            .iter()
            .find(|c| c.cov_pk == cov_pk)
            .and_then(|c| c.adaptor_sigs.get(fp_del_idx))
        {
            Some(asig) if available < inputs.covenant_quorum as usize => {
                available += 1;
                Some(asig.decrypt(fp_sk)?)
            }
            _ => None,
        };
        covenant_slots.push(sig);
    }

    if available < inputs.covenant_quorum as usize {
        return Err(WitnessError::InsufficientCovenantSignatures {
            available,
            quorum: inputs.covenant_quorum,
        });
    }

    let fp_slots = sorted_keys(inputs.fp_pks)
        .into_iter()
        .map(|pk| (pk == fp_pk).then_some(*fp_sig))
        .collect::<Vec<_>>();

    let mut witness = Witness::new();
    for slot in covenant_slots.iter().rev().chain(fp_slots.iter().rev()) {
        match slot {
            Some(sig) => witness.push(sig.serialize()),
            None => witness.push([0u8; 0]),
        }
    }
    witness.push(inputs.delegator_sig.serialize());
    witness.push(inputs.leaf.script.as_bytes());
    witness.push(inputs.leaf.control_block.serialize());

    Ok(witness)
}

/// What a slashing witness found on chain reveals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSlashingWitness {
    /// Covenant signatures keyed by hex-encoded covenant key.
    pub covenant_sigs: BTreeMap<String, Signature>,

    /// Sorted index of the finality provider that signed.
    pub fp_index: usize,

    /// The finality provider that signed.
    pub fp_pk: XOnlyPublicKey,
}

fn parse_slot(element: &[u8], slot: usize) -> Result<Option<Signature>, WitnessError> {
    if element.is_empty() {
        return Ok(None);
    }

    Signature::from_slice(element)
        .map(Some)
        .map_err(|_| WitnessError::InvalidSignature { slot })
}

/// Parses input 0's witness of a slashing transaction.
///
/// Only the first finality provider slot (in sorted order) carrying a signature is reported.
pub fn parse_slashing_witness(
    tx: &Transaction,
    covenant_pks: &[XOnlyPublicKey],
    fp_pks: &[XOnlyPublicKey],
) -> Result<ParsedSlashingWitness, WitnessError> {
    let input = tx
        .input
        .first()
        .ok_or_else(|| WitnessError::NoInputs(tx.compute_txid()))?;
    let witness = &input.witness;

    let n = covenant_pks.len();
    let m = fp_pks.len();
    let required = n + m + TRAILING_ELEMENTS;
    if witness.len() < required {
        return Err(WitnessError::TooShort {
            required,
            actual: witness.len(),
        });
    }

    let element = |pos: usize| witness.nth(pos).unwrap_or_default();

    let mut covenant_sigs = BTreeMap::new();
    for (i, cov_pk) in sorted_keys(covenant_pks).iter().enumerate() {
        let pos = n - 1 - i;
        if let Some(sig) = parse_slot(element(pos), pos)? {
            covenant_sigs.insert(pk_hex(cov_pk), sig);
        }
    }

    for (i, fp_pk) in sorted_keys(fp_pks).into_iter().enumerate() {
        let pos = n + m - 1 - i;
        if parse_slot(element(pos), pos)?.is_some() {
            return Ok(ParsedSlashingWitness {
                covenant_sigs,
                fp_index: i,
                fp_pk,
            });
        }
    }

    Err(WitnessError::NoFinalityProviderSignature)
}
