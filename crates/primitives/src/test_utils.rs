//! Test utilities for the primitives.
//!
//! These utilities are not written in the `test-utils` crate to keep the primitives crate
//! completely independent.

use std::collections::HashSet;

use bitcoin::XOnlyPublicKey;
use proptest::prelude::*;
use secp256k1::{rand::thread_rng, SecretKey, SECP256K1};

/// Strategy producing valid secret keys.
pub(crate) fn arb_secret_key() -> impl Strategy<Value = SecretKey> {
    any::<[u8; 32]>().prop_filter_map("not a valid secret key", |bytes| {
        SecretKey::from_slice(&bytes).ok()
    })
}

/// Generates `count` secret keys with distinct x-only public keys.
pub(crate) fn generate_keys(count: usize) -> (Vec<SecretKey>, Vec<XOnlyPublicKey>) {
    let mut seen = HashSet::new();
    let mut sks = Vec::with_capacity(count);
    let mut pks = Vec::with_capacity(count);

    while pks.len() != count {
        let sk = SecretKey::new(&mut thread_rng());
        let pk = sk.x_only_public_key(SECP256K1).0;

        if seen.insert(pk) {
            sks.push(sk);
            pks.push(pk);
        }
    }

    (sks, pks)
}

/// Generates a random x-only public key.
pub(crate) fn generate_xonly_pubkey() -> XOnlyPublicKey {
    SecretKey::new(&mut thread_rng())
        .x_only_public_key(SECP256K1)
        .0
}
