//! Module to generate arbitrary values for testing.
use std::collections::HashSet;

use bitcoin::{
    absolute::LockTime,
    hashes::Hash,
    key::rand::{rngs::OsRng, thread_rng, Rng},
    secp256k1::{schnorr::Signature, SecretKey, XOnlyPublicKey, SECP256K1},
    transaction::Version,
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};

/// Generates a random transaction ID.
pub fn generate_txid() -> Txid {
    let mut txid = [0u8; 32];
    OsRng.fill(&mut txid);

    Txid::from_slice(&txid).expect("should be able to generate arbitrary txid")
}

/// Generates a random outpoint.
pub fn generate_outpoint() -> OutPoint {
    let vout: u32 = OsRng.gen_range(0..16);

    OutPoint {
        txid: generate_txid(),
        vout,
    }
}

/// Generates a random signature.
pub fn generate_signature() -> Signature {
    let mut sig = [0u8; 64];
    OsRng.fill(&mut sig);

    Signature::from_slice(&sig).expect("should be able to generate arbitrary signature")
}

/// Generates a random secret key.
pub fn generate_secret_key() -> SecretKey {
    SecretKey::new(&mut thread_rng())
}

/// Generates a random x-only public key.
pub fn generate_xonly_pubkey() -> XOnlyPublicKey {
    generate_secret_key().x_only_public_key(SECP256K1).0
}

/// Generate `count` (private key, public key) pairs with distinct public keys as two separate
/// [`Vec`].
pub fn generate_keypairs(count: usize) -> (Vec<SecretKey>, Vec<XOnlyPublicKey>) {
    let mut seen = HashSet::new();
    let mut sks = Vec::with_capacity(count);
    let mut pks = Vec::with_capacity(count);

    while pks.len() != count {
        let sk = generate_secret_key();
        let pk = sk.x_only_public_key(SECP256K1).0;

        if seen.insert(pk) {
            sks.push(sk);
            pks.push(pk);
        }
    }

    (sks, pks)
}

/// Generates a random 32-byte array.
pub fn generate_bytes32() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    OsRng.fill(&mut bytes);
    bytes
}

/// Builds a version 2 transaction spending `inputs` with empty witnesses.
pub fn create_tx(inputs: &[OutPoint], outputs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|outpoint| TxIn {
                previous_output: *outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs,
    }
}

/// A transaction spending `outpoint` into a single output to an anyone-can-spend script.
pub fn spending_tx(outpoint: OutPoint, value: Amount) -> Transaction {
    create_tx(
        &[outpoint],
        vec![TxOut {
            value,
            script_pubkey: ScriptBuf::from_bytes(vec![0x51]),
        }],
    )
}
