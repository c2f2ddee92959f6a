//! Generic sign/verify helpers and the nonce-construction contract shared
//! by the sealed-box and the onion/path parsers.

use crate::{KeyError, SigningKeypair};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Sign arbitrary data with a keypair's long-lived or ephemeral signing key.
pub fn sign_data(keypair: &SigningKeypair, data: &[u8]) -> [u8; 64] {
    keypair.sign(data)
}

/// Verify a signature against a raw 32-byte verifying key. Prefer
/// `ExpandedVerificationKey::verify` on hot paths that repeatedly verify
/// under the same key.
pub fn verify_signature(public_key: &[u8; 32], data: &[u8], signature: &[u8; 64]) -> bool {
    let vk = match VerifyingKey::from_bytes(public_key) {
        Ok(vk) => vk,
        Err(_) => return false,
    };
    let sig = Signature::from_bytes(signature);
    vk.verify(data, &sig).is_ok()
}

/// Reconstruct the 24-byte domain-separated nonce from `(round, layer,
/// destination_id)` packed little-endian, per §4.A. The layer-number shift
/// applied by callers for reverse traffic (`layer + num_layers`) is the
/// caller's responsibility — this function only packs whatever layer value
/// it is given.
pub fn build_nonce(round: u32, layer: u32, destination_id: u32) -> [u8; 24] {
    let mut nonce = [0u8; 24];
    nonce[0..4].copy_from_slice(&round.to_le_bytes());
    nonce[4..8].copy_from_slice(&layer.to_le_bytes());
    nonce[8..12].copy_from_slice(&destination_id.to_le_bytes());
    nonce
}

/// Reverse-direction layer index used to domain-separate forward and
/// reverse traffic in the nonce (§4.G step 2).
pub fn reverse_layer(layer: u32, num_layers: u32) -> u32 {
    layer + num_layers
}

pub fn try_expand_public_key(public_key: &[u8; 32]) -> Result<VerifyingKey, KeyError> {
    VerifyingKey::from_bytes(public_key).map_err(|e| KeyError::InvalidBytes(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = SigningKeypair::generate();
        let data = b"onion payload";
        let sig = sign_data(&kp, data);
        assert!(verify_signature(&kp.public_key_bytes(), data, &sig));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let kp = SigningKeypair::generate();
        let other = SigningKeypair::generate();
        let sig = sign_data(&kp, b"data");
        assert!(!verify_signature(&other.public_key_bytes(), b"data", &sig));
    }

    #[test]
    fn verify_rejects_malformed_key_without_panic() {
        let sig = [0u8; 64];
        assert!(!verify_signature(&[0xFFu8; 32], b"x", &sig));
    }

    #[test]
    fn nonce_differs_by_layer() {
        let a = build_nonce(1, 0, 2);
        let b = build_nonce(1, 1, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn nonce_differs_by_round_and_dest() {
        let a = build_nonce(1, 0, 2);
        let b = build_nonce(2, 0, 2);
        let c = build_nonce(1, 0, 3);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn reverse_layer_shifts_by_num_layers() {
        assert_eq!(reverse_layer(2, 10), 12);
    }
}
