//! Schnorr adaptor signatures over secp256k1.
//!
//! Covenant members pre-sign every delegation's slashing transaction with a signature that is
//! encrypted under a finality provider's public key. The encrypted signature is useless on its
//! own: only the provider's secret key decrypts it. Conversely, anyone holding both the adaptor
//! signature and its decryption reveals the provider's secret key.
//!
//! Encoding is 66 bytes: a 33-byte compressed `R`, the 32-byte `s_hat` and one byte flagging
//! whether the decryption key has to be negated.

use std::fmt;

use bitcoin::{secp256k1::schnorr::Signature, XOnlyPublicKey};
use k256::{
    elliptic_curve::{ops::MulByGenerator, ops::Reduce, PrimeField},
    FieldBytes, ProjectivePoint, Scalar, U256,
};
use secp256k1::SecretKey;

use crate::{
    errors::AdaptorSigError,
    schnorr::{challenge, tagged_hash, NONCE_TAG},
    secp::{
        compressed, decompress, has_odd_y, lift_x, normalize_even, scalar_from_secret,
        secret_from_scalar, x_bytes,
    },
};

/// Length of a serialized adaptor signature.
pub const ADAPTOR_SIGNATURE_SIZE: usize = 66;

/// An encrypted BIP340 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AdaptorSignature {
    r: ProjectivePoint,
    s_hat: Scalar,
    needs_negation: bool,
}

impl fmt::Debug for AdaptorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdaptorSignature({})", hex::encode(self.to_bytes()))
    }
}

impl AdaptorSignature {
    /// Parses the 66-byte encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AdaptorSigError> {
        let bytes: &[u8; ADAPTOR_SIGNATURE_SIZE] =
            bytes.try_into().map_err(|_| AdaptorSigError::Malformed {
                expected: ADAPTOR_SIGNATURE_SIZE,
                actual: bytes.len(),
            })?;

        let mut r_bytes = [0u8; 33];
        r_bytes.copy_from_slice(&bytes[..33]);
        let r = decompress(&r_bytes)?;

        let s_hat: Option<Scalar> =
            Scalar::from_repr(*FieldBytes::from_slice(&bytes[33..65])).into();
        let s_hat = s_hat.ok_or(AdaptorSigError::ScalarOverflow)?;

        Ok(Self {
            r,
            s_hat,
            needs_negation: bytes[65] == 0x01,
        })
    }

    /// Serializes into the 66-byte encoding.
    pub fn to_bytes(&self) -> [u8; ADAPTOR_SIGNATURE_SIZE] {
        let mut out = [0u8; ADAPTOR_SIGNATURE_SIZE];
        out[..33].copy_from_slice(&compressed(&self.r));
        out[33..65].copy_from_slice(&self.s_hat.to_bytes());
        out[65] = u8::from(self.needs_negation);
        out
    }

    /// Whether the decryption key is negated when decrypting.
    pub const fn needs_negation(&self) -> bool {
        self.needs_negation
    }

    /// Produces an adaptor signature on `msg` by `sk`, encrypted under `enc_key`.
    ///
    /// `aux` is mixed into the deterministic nonce.
    pub fn encrypt_sign(
        sk: &SecretKey,
        enc_key: &XOnlyPublicKey,
        msg: &[u8; 32],
        aux: &[u8; 32],
    ) -> Result<Self, AdaptorSigError> {
        let (d, p) = normalize_even(scalar_from_secret(sk));
        let t = lift_x(&enc_key.serialize()).ok_or(AdaptorSigError::InvalidPoint)?;

        let nonce = tagged_hash(
            NONCE_TAG,
            &[aux, d.to_bytes().as_slice(), &x_bytes(&p), &enc_key.serialize(), msg],
        );
        let mut k = <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(nonce));
        if bool::from(k.is_zero()) {
            return Err(AdaptorSigError::ZeroSecret);
        }

        let mut r = ProjectivePoint::mul_by_generator(&k) + t;
        let needs_negation = has_odd_y(&r);
        if needs_negation {
            k = -k;
            r = -r;
        }

        let e = challenge(&x_bytes(&r), &x_bytes(&p), msg);
        let s_hat = k + e * d;

        Ok(Self {
            r,
            s_hat,
            needs_negation,
        })
    }

    /// Checks that this is a valid adaptor signature on `msg` by `pk`, encrypted under `enc_key`.
    pub fn verify(
        &self,
        pk: &XOnlyPublicKey,
        enc_key: &XOnlyPublicKey,
        msg: &[u8; 32],
    ) -> Result<(), AdaptorSigError> {
        if has_odd_y(&self.r) {
            return Err(AdaptorSigError::OddNonce);
        }

        let p = lift_x(&pk.serialize()).ok_or(AdaptorSigError::InvalidPoint)?;
        let t = lift_x(&enc_key.serialize()).ok_or(AdaptorSigError::InvalidPoint)?;

        let r_prime = if self.needs_negation {
            self.r + t
        } else {
            self.r - t
        };

        let e = challenge(&x_bytes(&self.r), &pk.serialize(), msg);
        if ProjectivePoint::mul_by_generator(&self.s_hat) - p * e != r_prime {
            return Err(AdaptorSigError::VerificationFailed);
        }

        Ok(())
    }

    /// Decrypts into a BIP340 signature with the secret key behind the encryption key.
    pub fn decrypt(&self, dk: &SecretKey) -> Result<Signature, AdaptorSigError> {
        let (mut t, _) = normalize_even(scalar_from_secret(dk));
        if self.needs_negation {
            t = -t;
        }

        let s = self.s_hat + t;

        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&x_bytes(&self.r));
        sig[32..].copy_from_slice(&s.to_bytes());

        Signature::from_slice(&sig).map_err(|_| AdaptorSigError::VerificationFailed)
    }

    /// Recovers the decryption key from a decrypted signature, checking it against `enc_key`.
    pub fn recover(
        &self,
        sig: &Signature,
        enc_key: &XOnlyPublicKey,
    ) -> Result<SecretKey, AdaptorSigError> {
        let bytes = sig.serialize();
        if bytes[..32] != x_bytes(&self.r) {
            return Err(AdaptorSigError::VerificationFailed);
        }

        let s: Option<Scalar> = Scalar::from_repr(*FieldBytes::from_slice(&bytes[32..])).into();
        let s = s.ok_or(AdaptorSigError::ScalarOverflow)?;

        let mut t = s - self.s_hat;
        if self.needs_negation {
            t = -t;
        }

        let sk = secret_from_scalar(&t)?;
        if sk.x_only_public_key(secp256k1::SECP256K1).0 != *enc_key {
            return Err(AdaptorSigError::VerificationFailed);
        }

        Ok(sk)
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::secp256k1::Message;
    use proptest::prelude::*;
    use secp256k1::SECP256K1;

    use super::*;
    use crate::test_utils::arb_secret_key;

    fn sign(sk: &SecretKey, fp_sk: &SecretKey, msg: &[u8; 32]) -> AdaptorSignature {
        let enc_key = fp_sk.x_only_public_key(SECP256K1).0;
        AdaptorSignature::encrypt_sign(sk, &enc_key, msg, &[0u8; 32]).unwrap()
    }

    proptest! {
        #[test]
        fn decrypted_signature_verifies(
            sk in arb_secret_key(),
            fp_sk in arb_secret_key(),
            msg in any::<[u8; 32]>(),
        ) {
            let pk = sk.x_only_public_key(SECP256K1).0;
            let enc_key = fp_sk.x_only_public_key(SECP256K1).0;
            let asig = sign(&sk, &fp_sk, &msg);

            prop_assert!(asig.verify(&pk, &enc_key, &msg).is_ok());

            let sig = asig.decrypt(&fp_sk).unwrap();
            prop_assert!(SECP256K1
                .verify_schnorr(&sig, &Message::from_digest(msg), &pk)
                .is_ok());
        }

        #[test]
        fn recover_reveals_the_decryption_key(
            sk in arb_secret_key(),
            fp_sk in arb_secret_key(),
            msg in any::<[u8; 32]>(),
        ) {
            let enc_key = fp_sk.x_only_public_key(SECP256K1).0;
            let asig = sign(&sk, &fp_sk, &msg);
            let sig = asig.decrypt(&fp_sk).unwrap();

            let recovered = asig.recover(&sig, &enc_key).unwrap();
            prop_assert_eq!(recovered.x_only_public_key(SECP256K1).0, enc_key);
        }

        #[test]
        fn encoding_keeps_every_field(
            sk in arb_secret_key(),
            fp_sk in arb_secret_key(),
            msg in any::<[u8; 32]>(),
        ) {
            let asig = sign(&sk, &fp_sk, &msg);
            let bytes = asig.to_bytes();

            prop_assert_eq!(bytes[65], u8::from(asig.needs_negation()));
            prop_assert_eq!(AdaptorSignature::from_bytes(&bytes).unwrap(), asig);
        }
    }

    #[test]
    fn encoding_roundtrip() {
        let sk = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let fp_sk = SecretKey::from_slice(&[0x22; 32]).unwrap();
        let asig = sign(&sk, &fp_sk, &[0x33; 32]);

        let bytes = asig.to_bytes();
        assert_eq!(bytes[0], 0x02, "nonce point is always stored with even y");
        assert_eq!(AdaptorSignature::from_bytes(&bytes).unwrap(), asig);
    }

    #[test]
    fn wrong_encryption_key_fails_verification() {
        let sk = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let fp_sk = SecretKey::from_slice(&[0x22; 32]).unwrap();
        let other = SecretKey::from_slice(&[0x44; 32]).unwrap();
        let msg = [0x33; 32];
        let asig = sign(&sk, &fp_sk, &msg);

        let pk = sk.x_only_public_key(SECP256K1).0;
        let wrong = other.x_only_public_key(SECP256K1).0;
        assert_eq!(
            asig.verify(&pk, &wrong, &msg),
            Err(AdaptorSigError::VerificationFailed)
        );

        let sig = asig.decrypt(&fp_sk).unwrap();
        assert_eq!(
            asig.recover(&sig, &wrong),
            Err(AdaptorSigError::VerificationFailed)
        );
    }

    #[test]
    fn malformed_lengths_are_rejected() {
        assert_eq!(
            AdaptorSignature::from_bytes(&[0u8; 65]),
            Err(AdaptorSigError::Malformed {
                expected: 66,
                actual: 65
            })
        );
    }
}
