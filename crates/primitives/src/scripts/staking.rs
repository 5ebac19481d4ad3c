//! The three spending conditions of a staking output.
//!
//! ```text
//! timelock:  <staker> OP_CHECKSIGVERIFY <lock_time> OP_CHECKSEQUENCEVERIFY
//! unbonding: <staker> OP_CHECKSIGVERIFY <covenant multisig> OP_NUMEQUAL
//! slashing:  <staker> OP_CHECKSIGVERIFY <fp 1-of-n> OP_NUMEQUALVERIFY <covenant multisig> OP_NUMEQUAL
//! ```

use bitcoin::{
    opcodes::all::{
        OP_CHECKSIG, OP_CHECKSIGADD, OP_CHECKSIGVERIFY, OP_CSV, OP_NUMEQUAL, OP_NUMEQUALVERIFY,
    },
    script::Builder,
    ScriptBuf, XOnlyPublicKey,
};

use crate::{errors::ScriptError, secp::sorted_keys};

/// Sorts `keys` and rejects sets that are too small or contain duplicates.
pub fn prepare_multisig_keys(keys: &[XOnlyPublicKey]) -> Result<Vec<XOnlyPublicKey>, ScriptError> {
    if keys.len() < 2 {
        return Err(ScriptError::InsufficientMultisigKeys(keys.len()));
    }

    let sorted = sorted_keys(keys);
    if sorted.windows(2).any(|w| w[0] == w[1]) {
        return Err(ScriptError::DuplicateKeys);
    }

    Ok(sorted)
}

/// A `quorum`-of-n `OP_CHECKSIGADD` multisig over the sorted `keys`.
pub fn multisig_script(
    keys: &[XOnlyPublicKey],
    quorum: u32,
    with_verify: bool,
) -> Result<ScriptBuf, ScriptError> {
    let keys = prepare_multisig_keys(keys)?;
    if quorum as usize > keys.len() {
        return Err(ScriptError::QuorumExceedsKeyCount {
            quorum,
            keys: keys.len(),
        });
    }

    let mut builder = Builder::new();
    for (i, key) in keys.iter().enumerate() {
        builder = builder.push_x_only_key(key);
        builder = if i == 0 {
            builder.push_opcode(OP_CHECKSIG)
        } else {
            builder.push_opcode(OP_CHECKSIGADD)
        };
    }

    let builder = builder.push_int(i64::from(quorum));
    let builder = if with_verify {
        builder.push_opcode(OP_NUMEQUALVERIFY)
    } else {
        builder.push_opcode(OP_NUMEQUAL)
    };

    Ok(builder.into_script())
}

/// `<key> OP_CHECKSIG[VERIFY]`
pub fn single_key_script(key: &XOnlyPublicKey, with_verify: bool) -> ScriptBuf {
    let builder = Builder::new().push_x_only_key(key);
    if with_verify {
        builder.push_opcode(OP_CHECKSIGVERIFY).into_script()
    } else {
        builder.push_opcode(OP_CHECKSIG).into_script()
    }
}

/// `<key> OP_CHECKSIGVERIFY <lock_time> OP_CHECKSEQUENCEVERIFY`
pub fn time_lock_script(key: &XOnlyPublicKey, lock_time: u16) -> ScriptBuf {
    Builder::new()
        .push_x_only_key(key)
        .push_opcode(OP_CHECKSIGVERIFY)
        .push_int(i64::from(lock_time))
        .push_opcode(OP_CSV)
        .into_script()
}

fn concat(scripts: &[&ScriptBuf]) -> ScriptBuf {
    let bytes = scripts
        .iter()
        .flat_map(|s| s.as_bytes().iter().copied())
        .collect::<Vec<u8>>();
    ScriptBuf::from_bytes(bytes)
}

/// The leaves of a staking (or unbonding) output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingScripts {
    /// Staker withdrawal after the timelock.
    pub time_lock: ScriptBuf,

    /// On-demand unbonding, co-signed by the covenant.
    pub unbonding: ScriptBuf,

    /// Slashing, co-signed by one finality provider and the covenant.
    pub slashing: ScriptBuf,
}

impl StakingScripts {
    /// Builds the leaves for a staker delegating to `fp_keys` under the given covenant.
    pub fn new(
        staker: &XOnlyPublicKey,
        fp_keys: &[XOnlyPublicKey],
        covenant_keys: &[XOnlyPublicKey],
        covenant_quorum: u32,
        lock_time: u16,
    ) -> Result<Self, ScriptError> {
        let staker_sig = single_key_script(staker, true);
        let covenant = multisig_script(covenant_keys, covenant_quorum, false)?;
        let fp = match fp_keys {
            [single] => single_key_script(single, true),
            many => multisig_script(many, 1, true)?,
        };

        Ok(Self {
            time_lock: time_lock_script(staker, lock_time),
            unbonding: concat(&[&staker_sig, &covenant]),
            slashing: concat(&[&staker_sig, &fp, &covenant]),
        })
    }
}
