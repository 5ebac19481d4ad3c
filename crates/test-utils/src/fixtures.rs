//! Fully signed delegations.
//!
//! A [`DelegationFixture`] owns every secret involved in a delegation: the staker, the finality
//! providers and the covenant committee. The transactions it builds carry real scripts,
//! signatures and covenant adaptor signatures, so that they can go through the same witness
//! assembly and key recovery as on mainnet.

use bitcoin::{
    secp256k1::{schnorr::Signature, SecretKey, XOnlyPublicKey, SECP256K1},
    Amount, OutPoint, ScriptBuf, Transaction, TxOut, Witness,
};
use vigilante_primitives::{
    adaptor::AdaptorSignature,
    delegation::{
        BtcDelegation, BtcUndelegation, CovenantAdaptorSignatures, CovenantUnbondingSignature,
        SlashingPath,
    },
    eots::{self, PubRand},
    finality::{vote_message, Evidence},
    params::StakingParams,
    scripts::{taproot::LeafSpend, StakingOutput, UnbondingOutput},
    secp::sorted_keys,
    witness::{build_slashing_witness, sign_slashing_tx, slashing_sighash, SlashingWitnessInputs},
};

use crate::bitcoin::{
    create_tx, generate_bytes32, generate_keypairs, generate_outpoint, generate_secret_key,
};

/// Default staked amount.
pub const STAKING_AMOUNT: Amount = Amount::from_sat(1_000_000);

/// Default staking timelock.
pub const STAKING_TIME: u16 = 1_000;

/// Default unbonding timelock.
pub const UNBONDING_TIME: u16 = 100;

/// Builds staking parameters for the given covenant committee.
pub fn staking_params(version: u32, covenant_pks: Vec<XOnlyPublicKey>, quorum: u32) -> StakingParams {
    StakingParams {
        version,
        covenant_pks,
        covenant_quorum: quorum,
        slashing_rate: 0.1,
        slashing_pk_script: ScriptBuf::from_bytes([[0x00, 0x14].as_slice(), &[0xcc; 20]].concat()),
        min_slashing_tx_fee: Amount::from_sat(1_000),
        unbonding_fee: Amount::from_sat(1_000),
        finalization_timeout: 10,
    }
}

/// A covenant committee and the parameters it is part of.
#[derive(Debug, Clone)]
pub struct Covenant {
    /// Secret keys of the members, in the order of `params.covenant_pks`.
    pub sks: Vec<SecretKey>,

    /// Parameters naming this committee.
    pub params: StakingParams,
}

impl Covenant {
    /// Creates a committee of `size` members with a quorum of `quorum`, under params `version`.
    pub fn new(version: u32, size: usize, quorum: u32) -> Self {
        let (sks, pks) = generate_keypairs(size);
        Self {
            sks,
            params: staking_params(version, pks, quorum),
        }
    }

    /// The secret key of `pk`.
    pub fn sk_of(&self, pk: &XOnlyPublicKey) -> Option<&SecretKey> {
        self.params
            .covenant_pks
            .iter()
            .position(|p| p == pk)
            .map(|i| &self.sks[i])
    }
}

/// A delegation and every secret behind it.
#[derive(Debug, Clone)]
pub struct DelegationFixture {
    /// The staker.
    pub staker_sk: SecretKey,

    /// The finality providers, in the order of `delegation.fp_pks`.
    pub fp_sks: Vec<SecretKey>,

    /// The covenant committee.
    pub covenant: Covenant,

    /// The delegation as the App chain reports it.
    pub delegation: BtcDelegation,
}

impl DelegationFixture {
    /// Builds an ACTIVE-ready delegation to `fp_sks` signed by the whole covenant committee,
    /// counting from `start_height`.
    pub fn new(covenant: &Covenant, fp_sks: &[SecretKey], start_height: u32) -> Self {
        Self::with_covenant_signers(covenant, fp_sks, start_height, covenant.sks.len())
    }

    /// Like [`DelegationFixture::new`] but only the first `signers` covenant members (in
    /// parameter order) provide signatures.
    pub fn with_covenant_signers(
        covenant: &Covenant,
        fp_sks: &[SecretKey],
        start_height: u32,
        signers: usize,
    ) -> Self {
        let params = &covenant.params;
        let (staker_sks, staker_pks) = generate_keypairs(1);
        let (staker_sk, staker_pk) = (staker_sks[0], staker_pks[0]);
        let fp_pks = fp_sks
            .iter()
            .map(|sk| sk.x_only_public_key(SECP256K1).0)
            .collect::<Vec<_>>();

        let staking_output = StakingOutput::new(
            &staker_pk,
            &fp_pks,
            &params.covenant_pks,
            params.covenant_quorum,
            STAKING_TIME,
            STAKING_AMOUNT,
        )
        .expect("must build staking output");

        let staking_tx = create_tx(&[generate_outpoint()], vec![staking_output.tx_out()]);
        let staking_outpoint = OutPoint::new(staking_tx.compute_txid(), 0);
        let staking_prevout = staking_output.tx_out();

        let unbonding_value = STAKING_AMOUNT - params.unbonding_fee;
        let unbonding_output = UnbondingOutput::new(
            &staker_pk,
            &fp_pks,
            &params.covenant_pks,
            params.covenant_quorum,
            UNBONDING_TIME,
            unbonding_value,
        )
        .expect("must build unbonding output");

        let unbonding_tx = create_tx(&[staking_outpoint], vec![unbonding_output.tx_out()]);
        let unbonding_outpoint = OutPoint::new(unbonding_tx.compute_txid(), 0);

        let slashing_tx = build_slashing_tx(staking_outpoint, STAKING_AMOUNT, params, &staker_pk);
        let unbonding_slashing_tx =
            build_slashing_tx(unbonding_outpoint, unbonding_value, params, &staker_pk);

        let staking_slashing_leaf = staking_output
            .slashing_path()
            .expect("must derive slashing path");
        let unbonding_slashing_leaf = unbonding_output
            .slashing_path()
            .expect("must derive unbonding slashing path");
        let unbonding_leaf = staking_output
            .unbonding_path()
            .expect("must derive unbonding path");

        let staking_slashing_sighash =
            slashing_sighash(&slashing_tx, &staking_prevout, &staking_slashing_leaf)
                .expect("must compute sighash");
        let unbonding_slashing_sighash = slashing_sighash(
            &unbonding_slashing_tx,
            &unbonding_output.tx_out(),
            &unbonding_slashing_leaf,
        )
        .expect("must compute sighash");
        let unbonding_sighash = slashing_sighash(&unbonding_tx, &staking_prevout, &unbonding_leaf)
            .expect("must compute sighash");

        let signing = covenant.sks.iter().zip(&params.covenant_pks).take(signers);
        let adaptor_sigs = |sighash: &[u8; 32]| {
            signing
                .clone()
                .map(|(cov_sk, cov_pk)| CovenantAdaptorSignatures {
                    cov_pk: *cov_pk,
                    adaptor_sigs: fp_pks
                        .iter()
                        .map(|fp_pk| {
                            AdaptorSignature::encrypt_sign(
                                cov_sk,
                                fp_pk,
                                sighash,
                                &generate_bytes32(),
                            )
                            .expect("must adaptor sign")
                        })
                        .collect(),
                })
                .collect::<Vec<_>>()
        };

        let delegation = BtcDelegation {
            staker_pk,
            fp_pks: fp_pks.clone(),
            staking_time: STAKING_TIME,
            start_height,
            end_height: start_height + STAKING_TIME as u32,
            total_sat: STAKING_AMOUNT,
            staking_tx,
            staking_output_idx: 0,
            slashing_tx,
            delegator_slashing_sig: sign_slashing_tx(&staking_slashing_sighash, &staker_sk),
            covenant_sigs: adaptor_sigs(&staking_slashing_sighash),
            unbonding_time: UNBONDING_TIME,
            btc_undelegation: BtcUndelegation {
                unbonding_tx,
                slashing_tx: unbonding_slashing_tx,
                delegator_unbonding_sig: None,
                delegator_slashing_sig: sign_slashing_tx(&unbonding_slashing_sighash, &staker_sk),
                covenant_slashing_sigs: adaptor_sigs(&unbonding_slashing_sighash),
                covenant_unbonding_sigs: signing
                    .clone()
                    .map(|(cov_sk, cov_pk)| CovenantUnbondingSignature {
                        cov_pk: *cov_pk,
                        sig: sign_slashing_tx(&unbonding_sighash, cov_sk),
                    })
                    .collect(),
            },
            params_version: params.version,
        };

        Self {
            staker_sk,
            fp_sks: fp_sks.to_vec(),
            covenant: covenant.clone(),
            delegation,
        }
    }

    /// Hash of the staking transaction.
    pub fn staking_tx_hash(&self) -> bitcoin::Txid {
        self.delegation.staking_tx_hash()
    }

    fn staking_output(&self) -> StakingOutput {
        self.delegation
            .staking_output(&self.covenant.params)
            .expect("must rebuild staking output")
    }

    /// The staker's signature on the unbonding transaction.
    pub fn staker_unbonding_sig(&self) -> Signature {
        let leaf = self
            .staking_output()
            .unbonding_path()
            .expect("must derive unbonding path");
        let sighash = slashing_sighash(
            &self.delegation.btc_undelegation.unbonding_tx,
            self.delegation.staking_tx_out().expect("has staking output"),
            &leaf,
        )
        .expect("must compute sighash");

        sign_slashing_tx(&sighash, &self.staker_sk)
    }

    /// Records the staker's unbonding signature, as the App chain does once the unbonding is
    /// reported.
    pub fn mark_unbonded(&mut self) {
        self.delegation.btc_undelegation.delegator_unbonding_sig = Some(self.staker_unbonding_sig());
    }

    /// The unbonding transaction with a complete witness.
    pub fn signed_unbonding_tx(&self) -> Transaction {
        let leaf = self
            .staking_output()
            .unbonding_path()
            .expect("must derive unbonding path");
        let undel = &self.delegation.btc_undelegation;

        let mut witness = Witness::new();
        for cov_pk in sorted_keys(&self.covenant.params.covenant_pks).iter().rev() {
            match undel.covenant_unbonding_sigs.iter().find(|s| s.cov_pk == *cov_pk) {
                Some(sig) => witness.push(sig.sig.serialize()),
                None => witness.push([0u8; 0]),
            }
        }
        push_tail(&mut witness, &self.staker_unbonding_sig(), &leaf);

        let mut tx = undel.unbonding_tx.clone();
        tx.input[0].witness = witness;
        tx
    }

    /// The slashing transaction for `path` with a complete witness, as assembled with the secret
    /// key of finality provider `fp_idx`.
    pub fn signed_slashing_tx(&self, path: SlashingPath, fp_idx: usize) -> Transaction {
        let params = &self.covenant.params;
        let (prevout, leaf) = match path {
            SlashingPath::Staking => {
                let output = self.staking_output();
                (output.tx_out(), output.slashing_path())
            }
            SlashingPath::Unbonding => {
                let output = self
                    .delegation
                    .unbonding_output(params)
                    .expect("must rebuild unbonding output");
                (output.tx_out(), output.slashing_path())
            }
        };
        let leaf = leaf.expect("must derive slashing path");

        let mut tx = self.delegation.slashing_tx(path).clone();
        let sighash = slashing_sighash(&tx, &prevout, &leaf).expect("must compute sighash");
        let fp_sk = &self.fp_sks[fp_idx];
        let fp_sig = sign_slashing_tx(&sighash, fp_sk);

        let inputs = SlashingWitnessInputs {
            covenant_pks: &params.covenant_pks,
            covenant_quorum: params.covenant_quorum,
            covenant_adaptor_sigs: self.delegation.covenant_adaptor_sigs(path),
            fp_pks: &self.delegation.fp_pks,
            delegator_sig: self.delegation.delegator_slashing_sig(path),
            leaf: &leaf,
        };
        tx.input[0].witness =
            build_slashing_witness(&inputs, fp_sk, &fp_sig).expect("must build witness");
        tx
    }
}

/// Evidence of `fp_sk` voting for two different blocks at `height`.
pub fn equivocation_evidence(fp_sk: &SecretKey, height: u64) -> Evidence {
    let sec_rand = generate_secret_key();
    let canonical = generate_bytes32();
    let fork = generate_bytes32();

    Evidence {
        fp_btc_pk: fp_sk.x_only_public_key(SECP256K1).0,
        block_height: height,
        pub_rand: PubRand::from_secret(&sec_rand),
        canonical_app_hash: canonical.to_vec(),
        fork_app_hash: fork.to_vec(),
        canonical_finality_sig: eots::sign(fp_sk, &sec_rand, &vote_message(height, &canonical)),
        fork_finality_sig: eots::sign(fp_sk, &sec_rand, &vote_message(height, &fork)),
    }
}

fn push_tail(witness: &mut Witness, sig: &Signature, leaf: &LeafSpend) {
    witness.push(sig.serialize());
    witness.push(leaf.script.as_bytes());
    witness.push(leaf.control_block.serialize());
}

fn build_slashing_tx(
    outpoint: OutPoint,
    value: Amount,
    params: &StakingParams,
    staker_pk: &XOnlyPublicKey,
) -> Transaction {
    let slashed = Amount::from_sat((value.to_sat() as f64 * params.slashing_rate) as u64);
    let change = value - slashed - params.min_slashing_tx_fee;

    create_tx(
        &[outpoint],
        vec![
            TxOut {
                value: slashed,
                script_pubkey: params.slashing_pk_script.clone(),
            },
            TxOut {
                value: change,
                script_pubkey: ScriptBuf::new_p2tr(SECP256K1, *staker_pk, None),
            },
        ],
    )
}

#[cfg(test)]
mod tests {
    use vigilante_primitives::{
        delegation::DelegationStatus,
        witness::parse_slashing_witness,
    };

    use super::*;

    #[test]
    fn fixture_is_active_and_consistent() {
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, _) = generate_keypairs(2);
        let fixture = DelegationFixture::new(&covenant, &fp_sks, 100);
        let del = &fixture.delegation;

        assert_eq!(
            del.status(150, covenant.params.finalization_timeout, 2),
            DelegationStatus::Active
        );
        assert_eq!(
            del.staking_tx_out().unwrap().script_pubkey,
            del.staking_output(&covenant.params).unwrap().pk_script()
        );
        assert_eq!(del.tracked().unwrap().staking_outpoint, del.staking_outpoint());
    }

    #[test]
    fn signed_slashing_tx_parses_back() {
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, fp_pks) = generate_keypairs(2);
        let fixture = DelegationFixture::new(&covenant, &fp_sks, 100);

        for path in [SlashingPath::Staking, SlashingPath::Unbonding] {
            let tx = fixture.signed_slashing_tx(path, 1);
            let parsed = parse_slashing_witness(&tx, &covenant.params.covenant_pks, &fp_pks).unwrap();

            assert_eq!(parsed.fp_pk, fp_pks[1]);
            assert_eq!(parsed.covenant_sigs.len(), 2);
        }
    }

    #[test]
    fn equivocation_evidence_reveals_the_key() {
        let (sks, pks) = generate_keypairs(1);
        let evidence = equivocation_evidence(&sks[0], 42);

        assert_eq!(evidence.fp_btc_pk, pks[0]);
        assert_eq!(
            evidence.extract_sk().unwrap().x_only_public_key(SECP256K1).0,
            pks[0]
        );
    }

    #[test]
    fn signed_unbonding_tx_has_staker_sig_third_from_end() {
        let covenant = Covenant::new(1, 3, 2);
        let (fp_sks, _) = generate_keypairs(1);
        let fixture = DelegationFixture::new(&covenant, &fp_sks, 100);

        let tx = fixture.signed_unbonding_tx();
        let witness = &tx.input[0].witness;
        assert_eq!(witness.len(), 3 + 3);
        assert_eq!(
            witness.nth(witness.len() - 3).unwrap(),
            fixture.staker_unbonding_sig().serialize().as_slice()
        );
    }
}
