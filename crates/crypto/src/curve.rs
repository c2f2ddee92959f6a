//! Raw Edwards25519 point arithmetic (§4.I): the anytrust group's combined
//! secret for one path is `(sum of member shares) * anonymous_key`, which
//! requires actual point addition across responders' partial
//! multiplications — something the X25519 (Montgomery) API deliberately
//! does not expose, since it's designed only for two-party DH.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::scalar::Scalar;

use crate::KeyError;

fn decompress(point: &[u8; 32]) -> Result<curve25519_dalek::edwards::EdwardsPoint, KeyError> {
    CompressedEdwardsY(*point)
        .decompress()
        .ok_or_else(|| KeyError::InvalidBytes("not a valid compressed Edwards point".into()))
}

/// Multiply `point` by `scalar_bytes` (reduced mod the curve order). Used
/// by a group member to apply its additive DH share to a path's anonymous
/// verification key.
pub fn edwards_scalar_multiply(scalar_bytes: &[u8; 32], point: &[u8; 32]) -> Result<[u8; 32], KeyError> {
    let scalar = Scalar::from_bytes_mod_order(*scalar_bytes);
    let p = decompress(point)?;
    Ok((p * scalar).compress().to_bytes())
}

/// Multiply the Edwards base point by `scalar_bytes`, i.e. derive the public
/// point for a private scalar the same way an Ed25519 verifying key is
/// derived from its signing scalar.
pub fn edwards_base_point_multiply(scalar_bytes: &[u8; 32]) -> [u8; 32] {
    let scalar = Scalar::from_bytes_mod_order(*scalar_bytes);
    (ED25519_BASEPOINT_POINT * scalar).compress().to_bytes()
}

/// Sum a set of partial multiplications back into the combined point:
/// `sum(share_i * A) == (sum share_i) * A`.
pub fn edwards_sum_points(points: &[[u8; 32]]) -> Result<[u8; 32], KeyError> {
    if points.is_empty() {
        return Err(KeyError::InvalidBytes("no points to sum".into()));
    }
    let mut acc = decompress(&points[0])?;
    for point in &points[1..] {
        acc += decompress(point)?;
    }
    Ok(acc.compress().to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_point_multiply_matches_an_ed25519_clamped_scalar() {
        // Ed25519 public keys are exactly `clamp(SHA-512(seed)[..32]) * B`;
        // clamping only clears low/high bits of a value still reduced the
        // same way by `from_bytes_mod_order`, so this function must agree
        // with the library's own derivation for any seed.
        use sha2::{Digest, Sha512};
        let seed = [9u8; 32];
        let hash = Sha512::digest(seed);
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&hash[..32]);
        scalar[0] &= 248;
        scalar[31] &= 127;
        scalar[31] |= 64;

        let expected = ed25519_dalek::SigningKey::from_bytes(&seed).verifying_key().to_bytes();
        assert_eq!(edwards_base_point_multiply(&scalar), expected);
    }

    #[test]
    fn additive_shares_match_single_combined_scalar() {
        let base = [7u8; 32];
        // any nonzero compressed point works for this test; derive one
        // from a keypair's public key so it's guaranteed on-curve.
        let kp = ed25519_dalek::SigningKey::from_bytes(&base);
        let point = kp.verifying_key().to_bytes();

        let share_a = Scalar::from_bytes_mod_order([1u8; 32]).to_bytes();
        let share_b = Scalar::from_bytes_mod_order([2u8; 32]).to_bytes();
        let combined_scalar = Scalar::from_bytes_mod_order(share_a) + Scalar::from_bytes_mod_order(share_b);

        let partial_a = edwards_scalar_multiply(&share_a, &point).unwrap();
        let partial_b = edwards_scalar_multiply(&share_b, &point).unwrap();
        let summed = edwards_sum_points(&[partial_a, partial_b]).unwrap();

        let direct = edwards_scalar_multiply(&combined_scalar.to_bytes(), &point).unwrap();
        assert_eq!(summed, direct);
    }

    #[test]
    fn sum_of_one_point_is_identity() {
        let kp = ed25519_dalek::SigningKey::from_bytes(&[3u8; 32]);
        let point = kp.verifying_key().to_bytes();
        let partial = edwards_scalar_multiply(&[5u8; 32], &point).unwrap();
        assert_eq!(edwards_sum_points(&[partial]).unwrap(), partial);
    }

    #[test]
    fn rejects_invalid_point_bytes() {
        let garbage = [0xFFu8; 32];
        assert!(edwards_scalar_multiply(&[1u8; 32], &garbage).is_err());
    }

    #[test]
    fn rejects_empty_sum() {
        assert!(edwards_sum_points(&[]).is_err());
    }
}
