//! Additively-shared BLS12-381 signing keys and the combined group public
//! key, grounded on the Go prototype's `KeyGenShares`/`MockKeyGen`.

use bls12_381::{G2Affine, G2Projective, Scalar};
use ff::Field;
use group::Group;
use rand_core::OsRng;

use crate::error::TokenError;

/// One anytrust group member's additive share of the group secret. Unlike a
/// Shamir threshold scheme, every share is required to reconstruct a
/// signature: the group's anytrust assumption ("at least one honest member
/// participates") rather than a quorum bound is what it relies on for
/// liveness.
#[derive(Clone, Copy)]
pub struct TokenSigningKeyShare {
    share: Scalar,
}

impl TokenSigningKeyShare {
    pub fn from_scalar(share: Scalar) -> Self {
        Self { share }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.share.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        let share = Scalar::from_bytes(bytes);
        if share.is_some().into() {
            Some(Self {
                share: share.unwrap(),
            })
        } else {
            None
        }
    }
}

/// The anytrust group's combined verification key, `master_secret * G2`.
#[derive(Clone, Copy)]
pub struct TokenPublicKey {
    point: G2Affine,
}

impl TokenPublicKey {
    pub fn from_point(point: G2Affine) -> Self {
        Self { point }
    }

    pub fn point(&self) -> &G2Affine {
        &self.point
    }

    pub fn to_bytes(&self) -> [u8; 96] {
        self.point.to_compressed()
    }

    pub fn from_bytes(bytes: &[u8; 96]) -> Result<Self, TokenError> {
        let point = G2Affine::from_compressed(bytes);
        if point.is_some().into() {
            Ok(Self {
                point: point.unwrap(),
            })
        } else {
            Err(TokenError::InvalidBytes(
                "not a valid compressed G2 point".into(),
            ))
        }
    }
}

/// Split `secret` additively into `num_shares` scalars summing to it.
fn additive_shares(secret: &Scalar, num_shares: usize) -> Vec<Scalar> {
    assert!(num_shares > 0, "num_shares must be positive");
    let mut shares = Vec::with_capacity(num_shares);
    let mut running_sum = Scalar::ZERO;
    for _ in 0..num_shares - 1 {
        let s = Scalar::random(&mut OsRng);
        running_sum += s;
        shares.push(s);
    }
    shares.push(secret - running_sum);
    shares
}

/// Generate `num_shares` additive key shares, the combined public key, and
/// the (otherwise-unused outside of testing and trustee bootstrap) master
/// secret, from a freshly random secret.
pub fn key_gen_shares(num_shares: usize) -> (Vec<TokenSigningKeyShare>, TokenPublicKey, Scalar) {
    let secret = Scalar::random(&mut OsRng);
    key_gen_shares_from_secret(num_shares, secret)
}

/// Deterministic variant of [`key_gen_shares`] for tests and
/// trustee-supplied master secrets.
pub fn key_gen_shares_from_secret(
    num_shares: usize,
    secret: Scalar,
) -> (Vec<TokenSigningKeyShare>, TokenPublicKey, Scalar) {
    let raw_shares = additive_shares(&secret, num_shares);
    let public_point = G2Affine::from(G2Projective::generator() * secret);
    let shares = raw_shares
        .into_iter()
        .map(TokenSigningKeyShare::from_scalar)
        .collect();
    (
        shares,
        TokenPublicKey::from_point(public_point),
        secret,
    )
}

impl TokenSigningKeyShare {
    pub fn share(&self) -> &Scalar {
        &self.share
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_sum_to_secret() {
        let secret = Scalar::random(&mut OsRng);
        let shares = additive_shares(&secret, 5);
        let sum: Scalar = shares.iter().fold(Scalar::ZERO, |acc, s| acc + s);
        assert_eq!(sum, secret);
    }

    #[test]
    fn public_key_matches_secret() {
        let (_, public_key, secret) = key_gen_shares(4);
        let expected = G2Affine::from(G2Projective::generator() * secret);
        assert_eq!(public_key.point().to_compressed(), expected.to_compressed());
    }

    #[test]
    fn public_key_roundtrips_through_bytes() {
        let (_, public_key, _) = key_gen_shares(3);
        let bytes = public_key.to_bytes();
        let restored = TokenPublicKey::from_bytes(&bytes).unwrap();
        assert_eq!(restored.to_bytes(), bytes);
    }

    #[test]
    fn public_key_rejects_garbage_bytes() {
        let bytes = [0xFFu8; 96];
        assert!(TokenPublicKey::from_bytes(&bytes).is_err());
    }

    #[test]
    fn share_roundtrips_through_bytes() {
        let (shares, ..) = key_gen_shares(2);
        let bytes = shares[0].to_bytes();
        let restored = TokenSigningKeyShare::from_bytes(&bytes).unwrap();
        assert_eq!(restored.to_bytes(), bytes);
    }

    #[test]
    #[should_panic(expected = "num_shares must be positive")]
    fn additive_shares_rejects_zero_shares() {
        let _ = additive_shares(&Scalar::random(&mut OsRng), 0);
    }
}
