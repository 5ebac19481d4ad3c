//! Extractable one-time signatures.
//!
//! An EOTS is the `s` half of a BIP340 signature whose nonce `R` (the public randomness) is
//! committed ahead of time. Signing two different messages under the same randomness reveals the
//! secret key: `s1 - s2 = (e1 - e2) * d`.

use std::fmt;

use bitcoin::XOnlyPublicKey;
use k256::{
    elliptic_curve::{ops::MulByGenerator, PrimeField},
    FieldBytes, ProjectivePoint, Scalar,
};
use secp256k1::{SecretKey, SECP256K1};
use sha2::{Digest, Sha256};

use crate::{
    errors::EotsError,
    schnorr::challenge,
    secp::{lift_x, normalize_even, scalar_from_secret, secret_from_scalar, x_bytes},
};

/// Hashes a message the way finality signatures are computed over it.
pub fn msg_hash(msg: &[u8]) -> [u8; 32] {
    Sha256::digest(msg).into()
}

/// Public randomness committed by a finality provider: an x-only point.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PubRand(ProjectivePoint);

impl fmt::Debug for PubRand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubRand({})", hex::encode(self.to_bytes()))
    }
}

impl PubRand {
    /// Parses a 32-byte x coordinate.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EotsError> {
        let x: &[u8; 32] = bytes
            .try_into()
            .map_err(|_| EotsError::InvalidEncoding("public randomness"))?;
        lift_x(x)
            .map(Self)
            .ok_or(EotsError::InvalidEncoding("public randomness"))
    }

    /// The public randomness for a secret randomness.
    pub fn from_secret(sec_rand: &SecretKey) -> Self {
        Self(normalize_even(scalar_from_secret(sec_rand)).1)
    }

    /// The x coordinate.
    pub fn to_bytes(&self) -> [u8; 32] {
        x_bytes(&self.0)
    }
}

/// An extractable one-time signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EotsSignature(Scalar);

impl fmt::Debug for EotsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EotsSignature({})", hex::encode(self.to_bytes()))
    }
}

impl EotsSignature {
    /// Parses a 32-byte scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EotsError> {
        if bytes.len() != 32 {
            return Err(EotsError::InvalidEncoding("signature"));
        }
        let s: Option<Scalar> = Scalar::from_repr(*FieldBytes::from_slice(bytes)).into();
        s.map(Self).ok_or(EotsError::InvalidEncoding("signature"))
    }

    /// Big-endian scalar bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.0.to_bytes());
        out
    }
}

/// Signs `msg` with `sk` under the secret randomness `sec_rand`.
pub fn sign(sk: &SecretKey, sec_rand: &SecretKey, msg: &[u8]) -> EotsSignature {
    let (d, p) = normalize_even(scalar_from_secret(sk));
    let (k, r) = normalize_even(scalar_from_secret(sec_rand));

    let e = challenge(&x_bytes(&r), &x_bytes(&p), &msg_hash(msg));
    EotsSignature(k + e * d)
}

/// Verifies an EOTS against the signer's key and the committed randomness.
pub fn verify(pk: &XOnlyPublicKey, pub_rand: &PubRand, msg: &[u8], sig: &EotsSignature) -> bool {
    let Some(p) = lift_x(&pk.serialize()) else {
        return false;
    };

    let e = challenge(&pub_rand.to_bytes(), &pk.serialize(), &msg_hash(msg));
    ProjectivePoint::mul_by_generator(&sig.0) - p * e == pub_rand.0
}

/// Extracts the secret key from two signatures over different messages sharing `pub_rand`.
///
/// The returned key is the one whose public point has an even y coordinate, i.e. the key that
/// signs for `pk` under BIP340.
pub fn extract(
    pk: &XOnlyPublicKey,
    pub_rand: &PubRand,
    msg1: &[u8],
    sig1: &EotsSignature,
    msg2: &[u8],
    sig2: &EotsSignature,
) -> Result<SecretKey, EotsError> {
    let r_x = pub_rand.to_bytes();
    let p_x = pk.serialize();

    let e1 = challenge(&r_x, &p_x, &msg_hash(msg1));
    let e2 = challenge(&r_x, &p_x, &msg_hash(msg2));

    let e_delta: Option<Scalar> = (e1 - e2).invert().into();
    let e_delta = e_delta.ok_or(EotsError::IdenticalMessages)?;

    let d = (sig1.0 - sig2.0) * e_delta;
    let sk = secret_from_scalar(&d).map_err(|_| EotsError::KeyMismatch)?;

    if sk.x_only_public_key(SECP256K1).0 != *pk {
        return Err(EotsError::KeyMismatch);
    }

    Ok(sk)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::test_utils::arb_secret_key;

    proptest! {
        #[test]
        fn extract_recovers_the_signing_key(
            sk in arb_secret_key(),
            sec_rand in arb_secret_key(),
            msg1 in any::<[u8; 32]>(),
            msg2 in any::<[u8; 32]>(),
        ) {
            prop_assume!(msg1 != msg2);

            let pk = sk.x_only_public_key(SECP256K1).0;
            let pub_rand = PubRand::from_secret(&sec_rand);
            let sig1 = sign(&sk, &sec_rand, &msg1);
            let sig2 = sign(&sk, &sec_rand, &msg2);

            prop_assert!(verify(&pk, &pub_rand, &msg1, &sig1));
            prop_assert!(verify(&pk, &pub_rand, &msg2, &sig2));

            let extracted = extract(&pk, &pub_rand, &msg1, &sig1, &msg2, &sig2).unwrap();
            prop_assert_eq!(extracted.x_only_public_key(SECP256K1).0, pk);
        }
    }

    #[test]
    fn identical_messages_reveal_nothing() {
        let sk = SecretKey::from_slice(&[0x01; 32]).unwrap();
        let sec_rand = SecretKey::from_slice(&[0x02; 32]).unwrap();
        let pk = sk.x_only_public_key(SECP256K1).0;
        let pub_rand = PubRand::from_secret(&sec_rand);

        let sig = sign(&sk, &sec_rand, b"block");
        assert_eq!(
            extract(&pk, &pub_rand, b"block", &sig, b"block", &sig),
            Err(EotsError::IdenticalMessages)
        );
    }

    #[test]
    fn extraction_checks_the_public_key() {
        let sk = SecretKey::from_slice(&[0x01; 32]).unwrap();
        let other = SecretKey::from_slice(&[0x03; 32]).unwrap();
        let sec_rand = SecretKey::from_slice(&[0x02; 32]).unwrap();
        let pub_rand = PubRand::from_secret(&sec_rand);

        let sig1 = sign(&sk, &sec_rand, b"canonical");
        let sig2 = sign(&sk, &sec_rand, b"fork");

        let wrong_pk = other.x_only_public_key(SECP256K1).0;
        assert_eq!(
            extract(&wrong_pk, &pub_rand, b"canonical", &sig1, b"fork", &sig2),
            Err(EotsError::KeyMismatch)
        );
    }

    #[test]
    fn signature_encoding_rejects_bad_lengths() {
        assert_eq!(
            EotsSignature::from_bytes(&[0u8; 31]),
            Err(EotsError::InvalidEncoding("signature"))
        );
        assert!(PubRand::from_bytes(&[0u8; 33]).is_err());
    }
}
