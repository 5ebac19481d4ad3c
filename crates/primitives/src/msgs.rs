//! Messages the tracker submits to the App chain.

use bitcoin::{secp256k1::schnorr::Signature, Txid};
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};

/// Proof that a finality provider colluded with the covenant to broadcast a slashing transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSelectiveSlashingEvidence {
    /// Submitter address.
    pub signer: String,

    /// The delegation whose slashing transaction was broadcast.
    pub staking_tx_hash: String,

    /// The provider's secret key recovered from the adaptor signatures.
    #[serde(with = "hex::serde")]
    pub recovered_fp_btc_sk: Vec<u8>,
}

impl MsgSelectiveSlashingEvidence {
    /// Builds the message.
    pub fn new(signer: String, staking_tx_hash: Txid, recovered_fp_btc_sk: &SecretKey) -> Self {
        Self {
            signer,
            staking_tx_hash: staking_tx_hash.to_string(),
            recovered_fp_btc_sk: recovered_fp_btc_sk.secret_bytes().to_vec(),
        }
    }
}

/// Reports the staker's signature on an unbonding transaction seen on Bitcoin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBtcUndelegate {
    /// Submitter address.
    pub signer: String,

    /// The delegation that unbonded.
    pub staking_tx_hash: String,

    /// Staker signature on the unbonding transaction.
    #[serde(with = "hex::serde")]
    pub unbonding_tx_sig: Vec<u8>,
}

impl MsgBtcUndelegate {
    /// Builds the message.
    pub fn new(signer: String, staking_tx_hash: Txid, unbonding_tx_sig: &Signature) -> Self {
        Self {
            signer,
            staking_tx_hash: staking_tx_hash.to_string(),
            unbonding_tx_sig: unbonding_tx_sig.serialize().to_vec(),
        }
    }
}

/// Any message the tracker sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum AppMsg {
    /// See [`MsgSelectiveSlashingEvidence`].
    #[serde(rename = "/babylon.btcstaking.v1.MsgSelectiveSlashingEvidence")]
    SelectiveSlashingEvidence(MsgSelectiveSlashingEvidence),

    /// See [`MsgBtcUndelegate`].
    #[serde(rename = "/babylon.btcstaking.v1.MsgBTCUndelegate")]
    BtcUndelegate(MsgBtcUndelegate),
}

impl AppMsg {
    /// The delegation the message refers to.
    pub fn staking_tx_hash(&self) -> &str {
        match self {
            Self::SelectiveSlashingEvidence(msg) => &msg.staking_tx_hash,
            Self::BtcUndelegate(msg) => &msg.staking_tx_hash,
        }
    }
}

impl From<MsgSelectiveSlashingEvidence> for AppMsg {
    fn from(msg: MsgSelectiveSlashingEvidence) -> Self {
        Self::SelectiveSlashingEvidence(msg)
    }
}

impl From<MsgBtcUndelegate> for AppMsg {
    fn from(msg: MsgBtcUndelegate) -> Self {
        Self::BtcUndelegate(msg)
    }
}
