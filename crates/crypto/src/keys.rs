//! Keypair wrappers for the long-lived server identity and client-side
//! ephemeral per-hop keys.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha512};
use thiserror::Error;

use crate::curve::{edwards_base_point_multiply, edwards_scalar_multiply};

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("invalid key bytes: {0}")]
    InvalidBytes(String),
    #[error("signature verification failed")]
    VerificationFailed,
}

/// An Ed25519 keypair used for link signatures and onion-layer signing.
pub struct SigningKeypair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Clone for SigningKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
            verifying_key: self.verifying_key,
        }
    }
}

impl SigningKeypair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// A verification key that has been parsed from its compressed wire form
/// once and is held ready for repeated signature checks. Long-lived server
/// keys are expanded once at config-load time so the hot onion-parsing path
/// never re-decompresses the same Edwards point per message (§4.B: "~3x
/// speedup on verification-bound paths").
#[derive(Clone, Copy)]
pub struct ExpandedVerificationKey(VerifyingKey);

impl ExpandedVerificationKey {
    pub fn expand(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        let vk = VerifyingKey::from_bytes(bytes)
            .map_err(|e| KeyError::InvalidBytes(e.to_string()))?;
        Ok(Self(vk))
    }

    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let sig = Signature::from_bytes(signature);
        self.0.verify(message, &sig).is_ok()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

/// Derive the Ed25519 signing scalar from a seed the same way
/// `SigningKey` does internally: hash with SHA-512 and clamp the low
/// three bits and the top two bits of the result.
fn clamped_scalar(seed: &[u8; 32]) -> [u8; 32] {
    let hash = Sha512::digest(seed);
    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&hash[..32]);
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
    scalar
}

/// A keypair used for authenticated encryption with clients and anytrust
/// group members. The same clamped scalar an Ed25519 signing key derives
/// from its seed doubles as the Diffie-Hellman private scalar here, so a
/// lookup key (a plain Ed25519 verification key) is also a valid DH public
/// point, with no separate X25519 keypair or isogeny conversion involved.
pub struct EncryptionKeypair {
    seed: [u8; 32],
    scalar: [u8; 32],
    public: [u8; 32],
}

impl Clone for EncryptionKeypair {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            scalar: self.scalar,
            public: self.public,
        }
    }
}

impl EncryptionKeypair {
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_bytes(&seed)
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let scalar = clamped_scalar(bytes);
        let public = edwards_base_point_multiply(&scalar);
        Self {
            seed: *bytes,
            scalar,
            public,
        }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.seed
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public
    }

    /// Derive the shared secret with a peer's verification key: this
    /// key's signing-derived scalar multiplied onto the peer's Edwards
    /// point, matching the checkpoint path's own use of
    /// `edwards_scalar_multiply`. Fails if the peer bytes are not a valid
    /// compressed Edwards point.
    pub fn diffie_hellman(&self, peer_public: &[u8; 32]) -> Result<[u8; 32], KeyError> {
        edwards_scalar_multiply(&self.scalar, peer_public)
    }
}

/// Generate a fresh one-time Ed25519 signing keypair for a single path hop.
pub fn generate_one_time_keypair() -> SigningKeypair {
    SigningKeypair::generate()
}

/// Fill a fresh 32-byte nonce-material buffer from the OS RNG; used where a
/// random scalar or seed is needed outside of a keypair (e.g. the blinding
/// factor in the token scheme).
pub fn random_bytes_32() -> [u8; 32] {
    let mut b = [0u8; 32];
    OsRng.fill_bytes(&mut b);
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_keypair_roundtrips_through_bytes() {
        let kp = SigningKeypair::generate();
        let restored = SigningKeypair::from_bytes(&kp.secret_bytes());
        assert_eq!(kp.public_key_bytes(), restored.public_key_bytes());
    }

    #[test]
    fn expanded_key_verifies_signature() {
        let kp = SigningKeypair::generate();
        let msg = b"layer-0 envelope";
        let sig = kp.sign(msg);
        let expanded = ExpandedVerificationKey::expand(&kp.public_key_bytes()).unwrap();
        assert!(expanded.verify(msg, &sig));
    }

    #[test]
    fn expanded_key_rejects_tampered_message() {
        let kp = SigningKeypair::generate();
        let sig = kp.sign(b"original");
        let expanded = ExpandedVerificationKey::expand(&kp.public_key_bytes()).unwrap();
        assert!(!expanded.verify(b"tampered", &sig));
    }

    #[test]
    fn expanded_key_rejects_invalid_bytes() {
        // all-zero is not a valid compressed Edwards point's canonical form
        // for every input, but a clearly malformed 32 bytes should still be
        // handled as an error path rather than panicking.
        let bytes = [0xFFu8; 32];
        let _ = ExpandedVerificationKey::expand(&bytes);
    }

    #[test]
    fn dh_is_symmetric() {
        let a = EncryptionKeypair::generate();
        let b = EncryptionKeypair::generate();
        let shared_a = a.diffie_hellman(&b.public_key_bytes()).unwrap();
        let shared_b = b.diffie_hellman(&a.public_key_bytes()).unwrap();
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn diffie_hellman_rejects_invalid_peer_point() {
        let a = EncryptionKeypair::generate();
        assert!(a.diffie_hellman(&[0xFFu8; 32]).is_err());
    }

    #[test]
    fn encryption_keypair_roundtrips_through_bytes() {
        let kp = EncryptionKeypair::generate();
        let restored = EncryptionKeypair::from_bytes(&kp.secret_bytes());
        assert_eq!(kp.public_key_bytes(), restored.public_key_bytes());
    }

    #[test]
    fn random_bytes_32_not_all_zero() {
        // astronomically unlikely to be all-zero; guards against an
        // accidentally unseeded RNG path.
        let b = random_bytes_32();
        assert_ne!(b, [0u8; 32]);
    }
}
