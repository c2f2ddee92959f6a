//! The blind-signature protocol itself: hash-to-curve, blind, partial-sign,
//! combine, unblind, verify (§4.J).

use bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use bls12_381::{pairing, G1Affine, G1Projective, G2Affine, Scalar};
use ff::Field;
use group::{Group, GroupEncoding};
use rand_core::OsRng;

use duskmesh_core::TOKEN_SIZE;

use crate::error::TokenError;
use crate::keys::{TokenPublicKey, TokenSigningKeyShare};

const HASH_TO_CURVE_DST: &[u8] = b"DUSKMESH-TOKEN-BLS12381G1_XMD:SHA-256_SSWU_RO_";

/// Client-held state between `prepare` and `combine_and_unblind`. Never
/// transmitted.
pub struct TokenIssuanceState {
    hash: G1Projective,
    blinding: Scalar,
}

fn hash_to_curve_point(message: &[u8]) -> G1Projective {
    <G1Projective as HashToCurve<ExpandMsgXmd<sha2::Sha256>>>::hash_to_curve(
        message,
        HASH_TO_CURVE_DST,
    )
}

/// Hash `message` to G1 and blind it with a fresh random scalar. Returns the
/// blinded point to submit to the anytrust group and the state needed to
/// unblind the eventual partial responses.
pub fn prepare(message: &[u8]) -> (G1Affine, TokenIssuanceState) {
    let hash = hash_to_curve_point(message);
    let blinding = Scalar::random(&mut OsRng);
    let blinded = G1Affine::from(hash * blinding);
    (blinded, TokenIssuanceState { hash, blinding })
}

impl TokenSigningKeyShare {
    /// Partially sign a blinded hash with this member's additive share.
    /// Rejects points outside the prime-order subgroup (§4.J: "subgroup
    /// checks are mandatory on received G1 points").
    pub fn blind_sign(&self, blinded_hash: &G1Affine) -> Result<G1Affine, TokenError> {
        if !bool::from(blinded_hash.is_torsion_free()) {
            return Err(TokenError::BadElement);
        }
        let out = G1Projective::from(*blinded_hash) * self.share();
        Ok(G1Affine::from(out))
    }
}

/// A combined, unblinded signature: `master_secret * hash(message)`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SignedToken {
    point: G1Affine,
}

impl SignedToken {
    pub const LEN: usize = TOKEN_SIZE;

    pub fn to_bytes(&self) -> [u8; 48] {
        self.point.to_compressed()
    }

    pub fn from_bytes(bytes: &[u8; 48]) -> Result<Self, TokenError> {
        let point = G1Affine::from_compressed(bytes);
        if point.is_some().into() {
            Ok(Self {
                point: point.unwrap(),
            })
        } else {
            Err(TokenError::InvalidBytes(
                "not a valid compressed G1 point".into(),
            ))
        }
    }

    pub fn point(&self) -> &G1Affine {
        &self.point
    }

    pub fn hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.point.to_bytes().as_ref());
        hasher.finalize().into()
    }
}

/// Sum the partial signatures, unblind with the issuance state, and verify
/// the result against the group's public key before handing back a token.
pub fn combine_and_unblind(
    state: TokenIssuanceState,
    partials: &[G1Affine],
    public_key: &TokenPublicKey,
) -> Result<SignedToken, TokenError> {
    let combined: G1Projective = partials
        .iter()
        .fold(G1Projective::identity(), |acc, p| acc + p);

    let inv_blinding: Scalar = state
        .blinding
        .invert()
        .into_option()
        .ok_or(TokenError::VerificationFailed)?;
    let unblinded = G1Affine::from(combined * inv_blinding);

    if !verify_pairing(&unblinded, &G1Affine::from(state.hash), public_key.point()) {
        return Err(TokenError::VerificationFailed);
    }

    Ok(SignedToken { point: unblinded })
}

/// Verify a token against an arbitrary message, independent of any
/// particular issuance session — used by servers and clients that only hold
/// the group's public key.
pub fn verify_message(public_key: &TokenPublicKey, token: &SignedToken, message: &[u8]) -> bool {
    let hash = G1Affine::from(hash_to_curve_point(message));
    verify_pairing(&token.point, &hash, public_key.point())
}

fn verify_pairing(signature: &G1Affine, hash: &G1Affine, public_key: &G2Affine) -> bool {
    if !bool::from(signature.is_torsion_free()) {
        return false;
    }
    let lhs = pairing(signature, &G2Affine::generator());
    let rhs = pairing(hash, public_key);
    lhs == rhs
}
