//! Wire types of the App-chain gateway and their conversion into domain types.
//!
//! Keys, signatures, transactions and hashes travel as lowercase hex strings.

use bitcoin::{
    consensus::encode::deserialize_hex, secp256k1::schnorr::Signature, Amount, ScriptBuf,
    Transaction, XOnlyPublicKey,
};
use serde::{Deserialize, Serialize};
use vigilante_primitives::{
    adaptor::AdaptorSignature,
    delegation::{
        BtcDelegation, BtcUndelegation, CovenantAdaptorSignatures, CovenantUnbondingSignature,
    },
    eots::{EotsSignature, PubRand},
    errors::DecodeError,
    finality::{Evidence, FinalityProvider},
    params::StakingParams,
};

/// Event type emitted when a finality provider is slashed for equivocation.
pub const EVENT_SLASHED_FINALITY_PROVIDER: &str =
    "babylon.finality.v1.EventSlashedFinalityProvider";

/// Attribute of [`EVENT_SLASHED_FINALITY_PROVIDER`] carrying the evidence.
pub const EVIDENCE_ATTRIBUTE: &str = "evidence";

fn decode_hex(field: &'static str, s: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(s).map_err(|e| DecodeError::Hex {
        field,
        reason: e.to_string(),
    })
}

fn parse_pk(field: &'static str, s: &str) -> Result<XOnlyPublicKey, DecodeError> {
    XOnlyPublicKey::from_slice(&decode_hex(field, s)?).map_err(|e| DecodeError::invalid(field, e))
}

fn parse_sig(field: &'static str, s: &str) -> Result<Signature, DecodeError> {
    Signature::from_slice(&decode_hex(field, s)?).map_err(|e| DecodeError::invalid(field, e))
}

fn parse_tx(field: &'static str, s: &str) -> Result<Transaction, DecodeError> {
    deserialize_hex(s).map_err(|e| DecodeError::invalid(field, e))
}

/// BTC staking parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStakingParams {
    /// Version of the parameters.
    pub version: u32,

    /// BIP340 keys of the covenant committee.
    pub covenant_pks: Vec<String>,

    /// Number of covenant signatures required.
    pub covenant_quorum: u32,

    /// Decimal fraction of the stake that is slashed, e.g. `"0.100000000000000000"`.
    pub slashing_rate: String,

    /// Locking script receiving slashed funds.
    pub slashing_pk_script: String,

    /// Minimum fee of a slashing transaction, in satoshi.
    pub min_slashing_tx_fee_sat: u64,

    /// Fee of the unbonding transaction, in satoshi.
    pub unbonding_fee_sat: u64,

    /// Blocks before the end of the timelock at which a delegation loses its voting power.
    pub finalization_timeout: u32,
}

impl TryFrom<RpcStakingParams> for StakingParams {
    type Error = DecodeError;

    fn try_from(params: RpcStakingParams) -> Result<Self, Self::Error> {
        let covenant_pks = params
            .covenant_pks
            .iter()
            .map(|pk| parse_pk("covenant_pks", pk))
            .collect::<Result<Vec<_>, _>>()?;

        let slashing_rate = params
            .slashing_rate
            .parse::<f64>()
            .map_err(|e| DecodeError::invalid("slashing_rate", e))?;

        Ok(StakingParams {
            version: params.version,
            covenant_pks,
            covenant_quorum: params.covenant_quorum,
            slashing_rate,
            slashing_pk_script: ScriptBuf::from_bytes(decode_hex(
                "slashing_pk_script",
                &params.slashing_pk_script,
            )?),
            min_slashing_tx_fee: Amount::from_sat(params.min_slashing_tx_fee_sat),
            unbonding_fee: Amount::from_sat(params.unbonding_fee_sat),
            finalization_timeout: params.finalization_timeout,
        })
    }
}

/// A covenant member's adaptor signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcCovenantAdaptorSignatures {
    /// The covenant member.
    pub cov_pk: String,

    /// One 66-byte adaptor signature per finality provider of the delegation.
    pub adaptor_sigs: Vec<String>,
}

impl TryFrom<RpcCovenantAdaptorSignatures> for CovenantAdaptorSignatures {
    type Error = DecodeError;

    fn try_from(sigs: RpcCovenantAdaptorSignatures) -> Result<Self, Self::Error> {
        let adaptor_sigs = sigs
            .adaptor_sigs
            .iter()
            .map(|sig| {
                AdaptorSignature::from_bytes(&decode_hex("adaptor_sigs", sig)?)
                    .map_err(|e| DecodeError::invalid("adaptor_sigs", e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CovenantAdaptorSignatures {
            cov_pk: parse_pk("cov_pk", &sigs.cov_pk)?,
            adaptor_sigs,
        })
    }
}

impl From<&CovenantAdaptorSignatures> for RpcCovenantAdaptorSignatures {
    fn from(sigs: &CovenantAdaptorSignatures) -> Self {
        RpcCovenantAdaptorSignatures {
            cov_pk: sigs.cov_pk.to_string(),
            adaptor_sigs: sigs
                .adaptor_sigs
                .iter()
                .map(|sig| hex::encode(sig.to_bytes()))
                .collect(),
        }
    }
}

/// A covenant member's signature over the unbonding transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcCovenantSignature {
    /// The covenant member.
    pub pk: String,

    /// 64-byte BIP340 signature.
    pub sig: String,
}

/// The unbonding half of a delegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcBtcUndelegation {
    /// The unbonding transaction.
    pub unbonding_tx_hex: String,

    /// The unbonding slashing transaction.
    pub slashing_tx_hex: String,

    /// Staker signature on the unbonding transaction, once it unbonded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegator_unbonding_sig_hex: Option<String>,

    /// Staker signature on the unbonding slashing transaction.
    pub delegator_slashing_sig_hex: String,

    /// Covenant adaptor signatures over the unbonding slashing transaction.
    #[serde(default)]
    pub covenant_slashing_sigs: Vec<RpcCovenantAdaptorSignatures>,

    /// Covenant signatures over the unbonding transaction.
    #[serde(default)]
    pub covenant_unbonding_sig_list: Vec<RpcCovenantSignature>,
}

impl TryFrom<RpcBtcUndelegation> for BtcUndelegation {
    type Error = DecodeError;

    fn try_from(undel: RpcBtcUndelegation) -> Result<Self, Self::Error> {
        Ok(BtcUndelegation {
            unbonding_tx: parse_tx("unbonding_tx_hex", &undel.unbonding_tx_hex)?,
            slashing_tx: parse_tx("unbonding_slashing_tx_hex", &undel.slashing_tx_hex)?,
            delegator_unbonding_sig: undel
                .delegator_unbonding_sig_hex
                .filter(|sig| !sig.is_empty())
                .map(|sig| parse_sig("delegator_unbonding_sig_hex", &sig))
                .transpose()?,
            delegator_slashing_sig: parse_sig(
                "unbonding_delegator_slashing_sig_hex",
                &undel.delegator_slashing_sig_hex,
            )?,
            covenant_slashing_sigs: undel
                .covenant_slashing_sigs
                .into_iter()
                .map(CovenantAdaptorSignatures::try_from)
                .collect::<Result<_, _>>()?,
            covenant_unbonding_sigs: undel
                .covenant_unbonding_sig_list
                .iter()
                .map(|cov| {
                    Ok(CovenantUnbondingSignature {
                        cov_pk: parse_pk("covenant_unbonding_sig_list", &cov.pk)?,
                        sig: parse_sig("covenant_unbonding_sig_list", &cov.sig)?,
                    })
                })
                .collect::<Result<_, DecodeError>>()?,
        })
    }
}

/// A BTC delegation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcBtcDelegation {
    /// Key of the staker.
    pub btc_pk: String,

    /// Keys of the finality providers.
    pub fp_btc_pk_list: Vec<String>,

    /// Relative timelock of the staking output.
    pub staking_time: u16,

    /// Bitcoin height from which the delegation counts.
    pub start_height: u32,

    /// Bitcoin height at which the timelock ends.
    pub end_height: u32,

    /// Staked amount in satoshi.
    pub total_sat: u64,

    /// The staking transaction.
    pub staking_tx_hex: String,

    /// Index of the staking output.
    pub staking_output_idx: u32,

    /// The staking slashing transaction.
    pub slashing_tx_hex: String,

    /// Staker signature on the staking slashing transaction.
    pub delegator_slash_sig_hex: String,

    /// Covenant adaptor signatures over the staking slashing transaction.
    #[serde(default)]
    pub covenant_sigs: Vec<RpcCovenantAdaptorSignatures>,

    /// Relative timelock of the unbonding output.
    pub unbonding_time: u16,

    /// The unbonding data.
    pub undelegation_response: RpcBtcUndelegation,

    /// Version of the staking parameters the delegation was created under.
    pub params_version: u32,
}

impl TryFrom<RpcBtcDelegation> for BtcDelegation {
    type Error = DecodeError;

    fn try_from(del: RpcBtcDelegation) -> Result<Self, Self::Error> {
        let fp_pks = del
            .fp_btc_pk_list
            .iter()
            .map(|pk| parse_pk("fp_btc_pk_list", pk))
            .collect::<Result<Vec<_>, _>>()?;
        if fp_pks.is_empty() {
            return Err(DecodeError::invalid("fp_btc_pk_list", "empty"));
        }

        let delegation = BtcDelegation {
            staker_pk: parse_pk("btc_pk", &del.btc_pk)?,
            fp_pks,
            staking_time: del.staking_time,
            start_height: del.start_height,
            end_height: del.end_height,
            total_sat: Amount::from_sat(del.total_sat),
            staking_tx: parse_tx("staking_tx_hex", &del.staking_tx_hex)?,
            staking_output_idx: del.staking_output_idx,
            slashing_tx: parse_tx("slashing_tx_hex", &del.slashing_tx_hex)?,
            delegator_slashing_sig: parse_sig("delegator_slash_sig_hex", &del.delegator_slash_sig_hex)?,
            covenant_sigs: del
                .covenant_sigs
                .into_iter()
                .map(CovenantAdaptorSignatures::try_from)
                .collect::<Result<_, _>>()?,
            unbonding_time: del.unbonding_time,
            btc_undelegation: del.undelegation_response.try_into()?,
            params_version: del.params_version,
        };

        // Fails early on an out-of-range staking output index.
        delegation.staking_tx_out()?;

        Ok(delegation)
    }
}

/// A finality provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFinalityProvider {
    /// BIP340 key of the provider.
    pub btc_pk: String,

    /// App-chain height of the slashing, zero if not slashed.
    #[serde(default)]
    pub slashed_babylon_height: u64,

    /// Bitcoin height of the slashing, zero if not slashed.
    #[serde(default)]
    pub slashed_btc_height: u32,
}

impl TryFrom<RpcFinalityProvider> for FinalityProvider {
    type Error = DecodeError;

    fn try_from(fp: RpcFinalityProvider) -> Result<Self, Self::Error> {
        Ok(FinalityProvider {
            btc_pk: parse_pk("btc_pk", &fp.btc_pk)?,
            slashed_height: fp.slashed_babylon_height,
            slashed_btc_height: fp.slashed_btc_height,
        })
    }
}

/// Equivocation evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEvidence {
    /// Key of the equivocating provider.
    pub fp_btc_pk: String,

    /// Height of the conflicting votes.
    pub block_height: u64,

    /// Committed public randomness.
    pub pub_rand: String,

    /// App hash of the canonical block.
    pub canonical_app_hash: String,

    /// App hash of the fork block.
    pub fork_app_hash: String,

    /// EOTS over the canonical block.
    pub canonical_finality_sig: String,

    /// EOTS over the fork block.
    pub fork_finality_sig: String,
}

impl TryFrom<RpcEvidence> for Evidence {
    type Error = DecodeError;

    fn try_from(ev: RpcEvidence) -> Result<Self, Self::Error> {
        let eots_sig = |field: &'static str, s: &str| {
            EotsSignature::from_bytes(&decode_hex(field, s)?)
                .map_err(|e| DecodeError::invalid(field, e))
        };

        Ok(Evidence {
            fp_btc_pk: parse_pk("fp_btc_pk", &ev.fp_btc_pk)?,
            block_height: ev.block_height,
            pub_rand: PubRand::from_bytes(&decode_hex("pub_rand", &ev.pub_rand)?)
                .map_err(|e| DecodeError::invalid("pub_rand", e))?,
            canonical_app_hash: decode_hex("canonical_app_hash", &ev.canonical_app_hash)?,
            fork_app_hash: decode_hex("fork_app_hash", &ev.fork_app_hash)?,
            canonical_finality_sig: eots_sig("canonical_finality_sig", &ev.canonical_finality_sig)?,
            fork_finality_sig: eots_sig("fork_finality_sig", &ev.fork_finality_sig)?,
        })
    }
}

impl From<&Evidence> for RpcEvidence {
    fn from(ev: &Evidence) -> Self {
        RpcEvidence {
            fp_btc_pk: ev.fp_btc_pk.to_string(),
            block_height: ev.block_height,
            pub_rand: hex::encode(ev.pub_rand.to_bytes()),
            canonical_app_hash: hex::encode(&ev.canonical_app_hash),
            fork_app_hash: hex::encode(&ev.fork_app_hash),
            canonical_finality_sig: hex::encode(ev.canonical_finality_sig.to_bytes()),
            fork_finality_sig: hex::encode(ev.fork_finality_sig.to_bytes()),
        }
    }
}

/// Result of submitting a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    /// Hash of the App-chain transaction.
    pub tx_hash: String,

    /// ABCI result code, zero on success.
    pub code: u32,

    /// Execution log.
    #[serde(default)]
    pub raw_log: String,
}

/// A key/value attribute of an [`AbciEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    /// Attribute name.
    pub key: String,

    /// Attribute value.
    pub value: String,
}

/// An event emitted while executing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbciEvent {
    /// Fully qualified event type.
    #[serde(rename = "type")]
    pub kind: String,

    /// Attributes of the event.
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

/// A transaction matched by a subscription query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    /// Hash of the App-chain transaction.
    pub tx_hash: String,

    /// Height of the App-chain block.
    pub height: u64,

    /// Events emitted by the transaction.
    #[serde(default)]
    pub events: Vec<AbciEvent>,
}

impl TxEvent {
    /// The equivocation evidence carried by an `EventSlashedFinalityProvider` of this
    /// transaction, if any.
    pub fn slashed_fp_evidence(&self) -> Option<Result<Evidence, DecodeError>> {
        let raw = self
            .events
            .iter()
            .filter(|ev| ev.kind == EVENT_SLASHED_FINALITY_PROVIDER)
            .flat_map(|ev| ev.attributes.iter())
            .find(|attr| attr.key == EVIDENCE_ATTRIBUTE)?;

        Some(
            serde_json::from_str::<RpcEvidence>(&raw.value)
                .map_err(|e| DecodeError::invalid("evidence", e))
                .and_then(Evidence::try_from),
        )
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{
        absolute::LockTime, consensus::encode::serialize_hex, secp256k1::SecretKey,
        transaction::Version, TxOut,
    };
    use vigilante_primitives::{adaptor::ADAPTOR_SIGNATURE_SIZE, eots, finality::vote_message};

    use super::*;

    fn sk(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    fn pk_hex(byte: u8) -> String {
        sk(byte)
            .x_only_public_key(bitcoin::secp256k1::SECP256K1)
            .0
            .to_string()
    }

    fn evidence() -> (SecretKey, Evidence) {
        let fp_sk = sk(7);
        let sec_rand = sk(9);
        let (canonical, fork) = (vec![0xaa; 32], vec![0xbb; 32]);

        let ev = Evidence {
            fp_btc_pk: fp_sk.x_only_public_key(bitcoin::secp256k1::SECP256K1).0,
            block_height: 42,
            pub_rand: PubRand::from_secret(&sec_rand),
            canonical_finality_sig: eots::sign(&fp_sk, &sec_rand, &vote_message(42, &canonical)),
            fork_finality_sig: eots::sign(&fp_sk, &sec_rand, &vote_message(42, &fork)),
            canonical_app_hash: canonical,
            fork_app_hash: fork,
        };

        (fp_sk, ev)
    }

    fn tx(lock_time: u32) -> String {
        serialize_hex(&Transaction {
            version: Version::TWO,
            lock_time: LockTime::from_consensus(lock_time),
            input: vec![],
            output: vec![TxOut {
                value: Amount::from_sat(10_000),
                script_pubkey: ScriptBuf::new(),
            }],
        })
    }

    #[test]
    fn evidence_decodes_and_yields_the_key() {
        let (fp_sk, ev) = evidence();

        let decoded: Evidence = RpcEvidence::from(&ev).try_into().unwrap();
        assert_eq!(decoded, ev);

        let recovered = decoded.extract_sk().unwrap();
        assert_eq!(
            recovered.x_only_public_key(bitcoin::secp256k1::SECP256K1).0,
            fp_sk.x_only_public_key(bitcoin::secp256k1::SECP256K1).0
        );
    }

    #[test]
    fn tx_event_carries_slashing_evidence() {
        let (_, ev) = evidence();
        let json = serde_json::to_string(&RpcEvidence::from(&ev)).unwrap();

        let event = TxEvent {
            tx_hash: "AB".into(),
            height: 100,
            events: vec![
                AbciEvent {
                    kind: "message".into(),
                    attributes: vec![EventAttribute {
                        key: "action".into(),
                        value: "/babylon.finality.v1.MsgAddFinalitySig".into(),
                    }],
                },
                AbciEvent {
                    kind: EVENT_SLASHED_FINALITY_PROVIDER.into(),
                    attributes: vec![EventAttribute {
                        key: EVIDENCE_ATTRIBUTE.into(),
                        value: json,
                    }],
                },
            ],
        };

        assert_eq!(event.slashed_fp_evidence(), Some(Ok(ev)));
    }

    #[test]
    fn tx_event_without_slashing_is_ignored() {
        let event: TxEvent = serde_json::from_str(
            r#"{"tx_hash":"AB","height":3,"events":[{"type":"message","attributes":[]}]}"#,
        )
        .unwrap();

        assert!(event.slashed_fp_evidence().is_none());
    }

    #[test]
    fn garbled_evidence_is_reported() {
        let event = TxEvent {
            tx_hash: "AB".into(),
            height: 3,
            events: vec![AbciEvent {
                kind: EVENT_SLASHED_FINALITY_PROVIDER.into(),
                attributes: vec![EventAttribute {
                    key: EVIDENCE_ATTRIBUTE.into(),
                    value: "{not json".into(),
                }],
            }],
        };

        assert!(matches!(
            event.slashed_fp_evidence(),
            Some(Err(DecodeError::Invalid { field: "evidence", .. }))
        ));
    }

    #[test]
    fn staking_params_decode() {
        let params: StakingParams = RpcStakingParams {
            version: 2,
            covenant_pks: vec![pk_hex(1), pk_hex(2), pk_hex(3)],
            covenant_quorum: 2,
            slashing_rate: "0.100000000000000000".into(),
            slashing_pk_script: "0014".to_string() + &"00".repeat(20),
            min_slashing_tx_fee_sat: 1_000,
            unbonding_fee_sat: 500,
            finalization_timeout: 10,
        }
        .try_into()
        .unwrap();

        assert_eq!(params.covenant_pks.len(), 3);
        assert!((params.slashing_rate - 0.1).abs() < f64::EPSILON);
        assert!(params.slashing_pk_script.is_p2wpkh());
        assert!(params.is_quorum(2));
    }

    fn covenant_sigs(cov: u8, fps: &[u8], msg: &[u8; 32]) -> CovenantAdaptorSignatures {
        CovenantAdaptorSignatures {
            cov_pk: sk(cov).x_only_public_key(bitcoin::secp256k1::SECP256K1).0,
            adaptor_sigs: fps
                .iter()
                .map(|fp| {
                    let enc_key = sk(*fp).x_only_public_key(bitcoin::secp256k1::SECP256K1).0;
                    AdaptorSignature::encrypt_sign(&sk(cov), &enc_key, msg, &[0u8; 32]).unwrap()
                })
                .collect(),
        }
    }

    #[test]
    fn covenant_adaptor_signatures_decode() {
        let sigs = covenant_sigs(3, &[2, 4], &[0x55; 32]);

        let rpc = RpcCovenantAdaptorSignatures::from(&sigs);
        assert!(rpc
            .adaptor_sigs
            .iter()
            .all(|sig| sig.len() == 2 * ADAPTOR_SIGNATURE_SIZE));

        let decoded = CovenantAdaptorSignatures::try_from(rpc.clone()).unwrap();
        assert_eq!(decoded, sigs);

        // the decrypted signatures still verify after the trip through hex
        let fp_sk = sk(2);
        let fp_pk = fp_sk.x_only_public_key(bitcoin::secp256k1::SECP256K1).0;
        let sig = decoded.adaptor_sigs[0].decrypt(&fp_sk).unwrap();
        let recovered = decoded.adaptor_sigs[0].recover(&sig, &fp_pk).unwrap();
        assert_eq!(
            recovered.x_only_public_key(bitcoin::secp256k1::SECP256K1).0,
            fp_pk
        );

        let mut short = rpc;
        short.adaptor_sigs[1].truncate(2 * (ADAPTOR_SIGNATURE_SIZE - 1));
        assert!(matches!(
            CovenantAdaptorSignatures::try_from(short),
            Err(DecodeError::Invalid { field: "adaptor_sigs", .. })
        ));
    }

    #[test]
    fn delegation_decodes() {
        let sig = "01".repeat(64);
        let rpc = RpcBtcDelegation {
            btc_pk: pk_hex(1),
            fp_btc_pk_list: vec![pk_hex(2)],
            staking_time: 1_000,
            start_height: 100,
            end_height: 1_100,
            total_sat: 10_000,
            staking_tx_hex: tx(1),
            staking_output_idx: 0,
            slashing_tx_hex: tx(2),
            delegator_slash_sig_hex: sig.clone(),
            covenant_sigs: vec![RpcCovenantAdaptorSignatures::from(&covenant_sigs(
                3,
                &[2],
                &[0x66; 32],
            ))],
            unbonding_time: 100,
            undelegation_response: RpcBtcUndelegation {
                unbonding_tx_hex: tx(3),
                slashing_tx_hex: tx(4),
                delegator_unbonding_sig_hex: Some(String::new()),
                delegator_slashing_sig_hex: sig.clone(),
                covenant_slashing_sigs: vec![],
                covenant_unbonding_sig_list: vec![RpcCovenantSignature {
                    pk: pk_hex(3),
                    sig,
                }],
            },
            params_version: 1,
        };

        let del: BtcDelegation = rpc.clone().try_into().unwrap();
        assert_eq!(del.total_sat, Amount::from_sat(10_000));
        assert!(!del.is_unbonded_early());
        assert_eq!(del.btc_undelegation.covenant_unbonding_sigs.len(), 1);
        assert_eq!(del.covenant_sigs, vec![covenant_sigs(3, &[2], &[0x66; 32])]);

        let mut bad_idx = rpc.clone();
        bad_idx.staking_output_idx = 5;
        assert!(BtcDelegation::try_from(bad_idx).is_err());

        let mut bad_hex = rpc;
        bad_hex.btc_pk = "zz".into();
        assert!(matches!(
            BtcDelegation::try_from(bad_hex),
            Err(DecodeError::Hex { field: "btc_pk", .. })
        ));
    }
}
