//! SECP256K1 primitives shared by the signature schemes.
//!
//! BIP340 keys are x-only, so every secret key that is used algebraically is first normalized to
//! the one whose public point has an even y coordinate.

use std::ops::Deref;

use bitcoin::XOnlyPublicKey;
use k256::{
    elliptic_curve::{
        ops::{MulByGenerator, Reduce},
        point::{AffineCoordinates, DecompressPoint},
        subtle::Choice,
    },
    AffinePoint, FieldBytes, ProjectivePoint, Scalar, U256,
};
use secp256k1::{Parity, SecretKey, SECP256K1};

use crate::errors::AdaptorSigError;

/// A secret key that is guaranteed to have an even x-only public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvenSecretKey(SecretKey);

impl Deref for EvenSecretKey {
    type Target = SecretKey;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<SecretKey> for EvenSecretKey {
    fn as_ref(&self) -> &SecretKey {
        &self.0
    }
}

impl From<SecretKey> for EvenSecretKey {
    fn from(value: SecretKey) -> Self {
        match value.x_only_public_key(SECP256K1).1 == Parity::Odd {
            true => Self(value.negate()),
            false => Self(value),
        }
    }
}

impl EvenSecretKey {
    /// The BIP340 public key of this secret.
    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.0.x_only_public_key(SECP256K1).0
    }

    /// The secret as a curve scalar.
    pub fn to_scalar(&self) -> Scalar {
        scalar_from_secret(&self.0)
    }
}

/// Hex encoding of a BIP340 public key, as used for map keys and App-chain queries.
pub fn pk_hex(pk: &XOnlyPublicKey) -> String {
    hex::encode(pk.serialize())
}

/// Sorts keys lexicographically by their 32-byte serialization, the order used inside the
/// staking tapscripts.
pub fn sort_keys(keys: &mut [XOnlyPublicKey]) {
    keys.sort_by_key(|k| k.serialize());
}

/// Returns a sorted copy of `keys`.
pub fn sorted_keys(keys: &[XOnlyPublicKey]) -> Vec<XOnlyPublicKey> {
    let mut sorted = keys.to_vec();
    sort_keys(&mut sorted);
    sorted
}

/// Converts a secret key into a scalar. Secret keys are always below the curve order.
pub(crate) fn scalar_from_secret(sk: &SecretKey) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(sk.secret_bytes()))
}

/// Converts a scalar back into a secret key, failing on zero.
pub(crate) fn secret_from_scalar(s: &Scalar) -> Result<SecretKey, AdaptorSigError> {
    SecretKey::from_slice(&s.to_bytes()).map_err(|_| AdaptorSigError::ZeroSecret)
}

/// Lifts an x-only coordinate to the curve point with even y.
pub(crate) fn lift_x(x: &[u8; 32]) -> Option<ProjectivePoint> {
    let point: Option<AffinePoint> =
        AffinePoint::decompress(&FieldBytes::from(*x), Choice::from(0)).into();
    point.map(ProjectivePoint::from)
}

/// The x coordinate of a point.
pub(crate) fn x_bytes(p: &ProjectivePoint) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&p.to_affine().x());
    out
}

/// SEC1 compressed encoding of a point.
pub(crate) fn compressed(p: &ProjectivePoint) -> [u8; 33] {
    let mut out = [0u8; 33];
    out[0] = if has_odd_y(p) { 0x03 } else { 0x02 };
    out[1..].copy_from_slice(&x_bytes(p));
    out
}

/// Parses a SEC1 compressed point.
pub(crate) fn decompress(bytes: &[u8; 33]) -> Result<ProjectivePoint, AdaptorSigError> {
    let odd = match bytes[0] {
        0x02 => 0,
        0x03 => 1,
        other => return Err(AdaptorSigError::InvalidPointPrefix(other)),
    };
    let point: Option<AffinePoint> =
        AffinePoint::decompress(FieldBytes::from_slice(&bytes[1..]), Choice::from(odd)).into();
    point
        .map(ProjectivePoint::from)
        .ok_or(AdaptorSigError::InvalidPoint)
}

/// Whether the y coordinate of a point is odd.
pub(crate) fn has_odd_y(p: &ProjectivePoint) -> bool {
    p.to_affine().y_is_odd().into()
}

/// Normalizes `x` so that `x*G` has an even y coordinate and returns the pair.
pub(crate) fn normalize_even(x: Scalar) -> (Scalar, ProjectivePoint) {
    let p = ProjectivePoint::mul_by_generator(&x);
    if has_odd_y(&p) {
        (-x, -p)
    } else {
        (x, p)
    }
}

#[cfg(test)]
mod tests {
    use secp256k1::rand::thread_rng;

    use super::*;

    #[test]
    fn even_secret_key_has_even_point() {
        for _ in 0..32 {
            let sk = SecretKey::new(&mut thread_rng());
            let even: EvenSecretKey = sk.into();

            let (xonly, parity) = even.as_ref().x_only_public_key(SECP256K1);
            assert_eq!(parity, Parity::Even);
            assert_eq!(xonly, sk.x_only_public_key(SECP256K1).0);
        }
    }

    #[test]
    fn scalar_conversion_is_lossless() {
        let sk = SecretKey::new(&mut thread_rng());
        let back = secret_from_scalar(&scalar_from_secret(&sk)).unwrap();
        assert_eq!(sk, back);
    }

    #[test]
    fn lift_x_matches_secp() {
        let sk: EvenSecretKey = SecretKey::new(&mut thread_rng()).into();
        let xonly = sk.x_only_public_key();

        let point = lift_x(&xonly.serialize()).unwrap();
        assert_eq!(point, ProjectivePoint::mul_by_generator(&sk.to_scalar()));
        assert!(!has_odd_y(&point));
    }

    #[test]
    fn compressed_points_roundtrip() {
        let sk = SecretKey::new(&mut thread_rng());
        let point = ProjectivePoint::mul_by_generator(&scalar_from_secret(&sk));

        let bytes = compressed(&point);
        assert_eq!(bytes, sk.public_key(SECP256K1).serialize());
        assert_eq!(decompress(&bytes).unwrap(), point);
        assert_eq!(
            decompress(&[0x05; 33]),
            Err(AdaptorSigError::InvalidPointPrefix(0x05))
        );
    }

    #[test]
    fn keys_are_sorted_lexicographically() {
        let mut keys = (0..8)
            .map(|_| SecretKey::new(&mut thread_rng()).x_only_public_key(SECP256K1).0)
            .collect::<Vec<_>>();
        sort_keys(&mut keys);

        assert!(keys.windows(2).all(|w| w[0].serialize() < w[1].serialize()));
    }
}
