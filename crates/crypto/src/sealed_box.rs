//! Authenticated sealed-box (§4.B): AES-CTR encrypt-then-sign with
//! domain-separated nonces.
//!
//! Non-repudiable encryption is required because signatures double as
//! evidence for blame protocols: anyone holding the sender's verification
//! key can confirm exactly what that sender encrypted, which is also why
//! this is a plain signature rather than an AEAD tag.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use ed25519_dalek::{Signature, Signer, Verifier, VerifyingKey};
use thiserror::Error;

use crate::{ExpandedVerificationKey, SigningKeypair};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SealedBoxError {
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("invalid verification key bytes")]
    InvalidKey,
}

/// Derive the 16-byte AES-128 key as the first half of an Edwards-curve DH
/// shared secret (§4.B).
fn aes_key_from_shared_secret(shared_secret: &[u8; 32]) -> [u8; 16] {
    let mut key = [0u8; 16];
    key.copy_from_slice(&shared_secret[..16]);
    key
}

/// IV is the first 16 bytes of the 24-byte domain-separated nonce.
fn iv_from_nonce(nonce: &[u8; 24]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&nonce[..16]);
    iv
}

fn aes_ctr_apply(shared_secret: &[u8; 32], nonce: &[u8; 24], data: &mut [u8]) {
    let key = aes_key_from_shared_secret(shared_secret);
    let iv = iv_from_nonce(nonce);
    let mut cipher = Aes128Ctr::new(&key.into(), &iv.into());
    cipher.apply_keystream(data);
}

/// Seal `plaintext` under `shared_secret`, appending an Ed25519 signature
/// over `nonce ‖ ciphertext` signed by `sender_signing_key`. Returns
/// `ciphertext ‖ signature(64B)`.
pub fn seal(
    shared_secret: &[u8; 32],
    nonce: &[u8; 24],
    plaintext: &[u8],
    sender_signing_key: &SigningKeypair,
) -> Vec<u8> {
    let mut ciphertext = plaintext.to_vec();
    aes_ctr_apply(shared_secret, nonce, &mut ciphertext);

    let mut signed_region = Vec::with_capacity(24 + ciphertext.len());
    signed_region.extend_from_slice(nonce);
    signed_region.extend_from_slice(&ciphertext);
    let signature = sender_signing_key.sign(&signed_region);

    let mut out = ciphertext;
    out.extend_from_slice(&signature);
    out
}

/// Open a sealed box: `signed_ciphertext` is `ciphertext ‖ signature(64B)`.
/// `nonce` is recomputed locally by the caller from `(round, layer, dest)`,
/// never transmitted. Verifies the signature under `verifying_key` before
/// decrypting.
pub fn open(
    shared_secret: &[u8; 32],
    nonce: &[u8; 24],
    signed_ciphertext: &[u8],
    verifying_key: &[u8; 32],
) -> Result<Vec<u8>, SealedBoxError> {
    let vk = VerifyingKey::from_bytes(verifying_key).map_err(|_| SealedBoxError::InvalidKey)?;
    open_with_key(shared_secret, nonce, signed_ciphertext, &vk)
}

/// Same as `open` but takes a pre-expanded verification key to avoid
/// re-decompressing the Edwards point on the hot onion-parsing path.
pub fn open_expanded(
    shared_secret: &[u8; 32],
    nonce: &[u8; 24],
    signed_ciphertext: &[u8],
    verifying_key: &ExpandedVerificationKey,
) -> Result<Vec<u8>, SealedBoxError> {
    if signed_ciphertext.len() < 64 {
        return Err(SealedBoxError::SignatureInvalid);
    }
    let split = signed_ciphertext.len() - 64;
    let (ciphertext, sig_bytes) = signed_ciphertext.split_at(split);
    let mut signed_region = Vec::with_capacity(24 + ciphertext.len());
    signed_region.extend_from_slice(nonce);
    signed_region.extend_from_slice(ciphertext);
    let mut sig = [0u8; 64];
    sig.copy_from_slice(sig_bytes);
    if !verifying_key.verify(&signed_region, &sig) {
        return Err(SealedBoxError::SignatureInvalid);
    }
    let mut plaintext = ciphertext.to_vec();
    aes_ctr_apply(shared_secret, nonce, &mut plaintext);
    Ok(plaintext)
}

fn open_with_key(
    shared_secret: &[u8; 32],
    nonce: &[u8; 24],
    signed_ciphertext: &[u8],
    verifying_key: &VerifyingKey,
) -> Result<Vec<u8>, SealedBoxError> {
    if signed_ciphertext.len() < 64 {
        return Err(SealedBoxError::SignatureInvalid);
    }
    let split = signed_ciphertext.len() - 64;
    let (ciphertext, sig_bytes) = signed_ciphertext.split_at(split);
    let mut signed_region = Vec::with_capacity(24 + ciphertext.len());
    signed_region.extend_from_slice(nonce);
    signed_region.extend_from_slice(ciphertext);
    let signature = Signature::from_slice(sig_bytes).map_err(|_| SealedBoxError::SignatureInvalid)?;
    verifying_key
        .verify(&signed_region, &signature)
        .map_err(|_| SealedBoxError::SignatureInvalid)?;
    let mut plaintext = ciphertext.to_vec();
    aes_ctr_apply(shared_secret, nonce, &mut plaintext);
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_nonce;

    #[test]
    fn seal_then_open_roundtrip() {
        let shared = [42u8; 32];
        let nonce = build_nonce(1, 0, 3);
        let sender = SigningKeypair::generate();
        let plaintext = b"bootstrap key material";

        let sealed = seal(&shared, &nonce, plaintext, &sender);
        let opened = open(&shared, &nonce, &sealed, &sender.public_key_bytes()).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn open_expanded_matches_open() {
        let shared = [7u8; 32];
        let nonce = build_nonce(2, 1, 0);
        let sender = SigningKeypair::generate();
        let plaintext = b"onion layer";
        let sealed = seal(&shared, &nonce, plaintext, &sender);

        let expanded = ExpandedVerificationKey::expand(&sender.public_key_bytes()).unwrap();
        let opened = open_expanded(&shared, &nonce, &sealed, &expanded).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn open_rejects_wrong_verification_key() {
        let shared = [1u8; 32];
        let nonce = build_nonce(0, 0, 0);
        let sender = SigningKeypair::generate();
        let other = SigningKeypair::generate();
        let sealed = seal(&shared, &nonce, b"data", &sender);

        let result = open(&shared, &nonce, &sealed, &other.public_key_bytes());
        assert!(matches!(result, Err(SealedBoxError::SignatureInvalid)));
    }

    #[test]
    fn open_rejects_wrong_nonce() {
        let shared = [1u8; 32];
        let nonce = build_nonce(0, 0, 0);
        let wrong_nonce = build_nonce(0, 1, 0);
        let sender = SigningKeypair::generate();
        let sealed = seal(&shared, &nonce, b"data", &sender);

        let result = open(&shared, &wrong_nonce, &sealed, &sender.public_key_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn open_rejects_tampered_ciphertext() {
        let shared = [1u8; 32];
        let nonce = build_nonce(5, 2, 1);
        let sender = SigningKeypair::generate();
        let mut sealed = seal(&shared, &nonce, b"original data", &sender);
        sealed[0] ^= 0xFF;

        let result = open(&shared, &nonce, &sealed, &sender.public_key_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn open_rejects_truncated_signature() {
        let shared = [1u8; 32];
        let nonce = build_nonce(0, 0, 0);
        let sender = SigningKeypair::generate();
        let sealed = seal(&shared, &nonce, b"data", &sender);
        let truncated = &sealed[..sealed.len() - 10];

        let result = open(&shared, &nonce, truncated, &sender.public_key_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn different_nonces_produce_different_ciphertext() {
        let shared = [9u8; 32];
        let sender = SigningKeypair::generate();
        let n1 = build_nonce(1, 0, 0);
        let n2 = build_nonce(1, 0, 1);
        let c1 = seal(&shared, &n1, b"same plaintext!!", &sender);
        let c2 = seal(&shared, &n2, b"same plaintext!!", &sender);
        assert_ne!(&c1[..16], &c2[..16]);
    }

    #[test]
    fn ciphertext_length_matches_plaintext_plus_signature() {
        let shared = [0u8; 32];
        let nonce = build_nonce(0, 0, 0);
        let sender = SigningKeypair::generate();
        let plaintext = vec![0u8; 128];
        let sealed = seal(&shared, &nonce, &plaintext, &sender);
        assert_eq!(sealed.len(), 128 + 64);
    }
}
