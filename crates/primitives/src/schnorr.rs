//! BIP340 building blocks shared by the adaptor and one-time signature schemes.

use k256::{elliptic_curve::ops::Reduce, FieldBytes, Scalar, U256};
use sha2::{Digest, Sha256};

/// Tag of the BIP340 challenge hash.
pub const CHALLENGE_TAG: &[u8] = b"BIP0340/challenge";

/// Tag used when deriving deterministic nonces.
pub const NONCE_TAG: &[u8] = b"BIP0340/nonce";

/// Computes `sha256(sha256(tag) || sha256(tag) || parts...)`.
pub fn tagged_hash(tag: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag);

    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    for part in parts {
        hasher.update(part);
    }

    hasher.finalize().into()
}

/// The BIP340 challenge `e = H_challenge(R.x || P.x || m) mod n`.
pub fn challenge(r_x: &[u8; 32], p_x: &[u8; 32], msg: &[u8; 32]) -> Scalar {
    let hash = tagged_hash(CHALLENGE_TAG, &[r_x, p_x, msg]);
    <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(hash))
}
