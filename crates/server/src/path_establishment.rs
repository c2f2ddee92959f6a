//! Path-establishment parser (§4.H): validates a blind-signature token,
//! installs a new bootstrap key, and forwards both the next path hop and
//! the boomerang slot that carries the eventual reply backward.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use duskmesh_core::{
    token_content, GroupId, PathEstablishmentEnvelopeView, PathEstablishmentInfoView, ServerId,
};
use duskmesh_crypto::{build_nonce, open, verify_signature, EncryptionKeypair};
use duskmesh_keytable::KeyLookupTable;
use duskmesh_token::{verify_message, SignedToken, TokenError, TokenPublicKey};

use crate::error::{Result, ServerError};

/// Reduce a 32-byte digest to an index in `[0, modulus)`. Used both to
/// route a token to the server its hash designates and, at the terminal
/// path layer, to the anytrust group it designates.
fn hash_to_index(digest: &[u8; 32], modulus: u32) -> u32 {
    let n = u64::from_le_bytes(digest[0..8].try_into().unwrap());
    (n % modulus as u64) as u32
}

/// What a parsed path record should do next: hop to another server, or
/// terminate at an anytrust group for checkpoint decryption.
pub enum PathOutcome {
    Forward {
        next_server: ServerId,
        next_envelope: Vec<u8>,
    },
    Terminal {
        group: GroupId,
    },
}

pub struct ParsedPath {
    pub in_key: [u8; 32],
    pub out_key: [u8; 32],
    pub out_token: SignedToken,
    pub boomerang_envelope: Vec<u8>,
    pub outcome: PathOutcome,
    /// The bootstrap-key record this layer just installed, shared with the
    /// reverse lightning router so a later boomerang decryption can route
    /// back toward `sender` without a second table lookup.
    pub record: duskmesh_keytable::SharedRecord,
}

pub struct PathEstablishmentParser {
    key_table: Arc<KeyLookupTable>,
    server_secret: EncryptionKeypair,
    combined_token_key: TokenPublicKey,
    round: u32,
    layer: u32,
    this_server: ServerId,
    num_servers: u32,
    num_groups: u32,
    boomerang_length: usize,
    terminal: bool,
}

impl PathEstablishmentParser {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key_table: Arc<KeyLookupTable>,
        server_secret: EncryptionKeypair,
        combined_token_key: TokenPublicKey,
        round: u32,
        layer: u32,
        this_server: ServerId,
        num_servers: u32,
        num_groups: u32,
        boomerang_length: usize,
        terminal: bool,
    ) -> Self {
        Self {
            key_table,
            server_secret,
            combined_token_key,
            round,
            layer,
            this_server,
            num_servers,
            num_groups,
            boomerang_length,
            terminal,
        }
    }

    pub fn parse_record_and_get_next(&self, sender: ServerId, message: &[u8]) -> Result<ParsedPath> {
        let view = PathEstablishmentEnvelopeView::interpret_from(message)?;
        let in_token = SignedToken::from_bytes(&view.in_token)?;

        // Path-establishment rounds advance one layer per round, so the
        // token content's round and layer fields are always equal here
        // (unlike the lightning round's nonce, which holds round fixed
        // across many layers within one round).
        let in_content = token_content(self.round, self.round, sender, &view.in_key);
        if !verify_message(&self.combined_token_key, &in_token, &in_content) {
            return Err(ServerError::Token(TokenError::VerificationFailed));
        }

        let in_hash = in_token.hash();
        let routed_here = hash_to_index(&in_hash, self.num_servers);
        if routed_here != self.this_server {
            return Err(ServerError::WrongServer {
                expected: routed_here,
                actual: self.this_server,
            });
        }

        let shared_key = self.server_secret.diffie_hellman(&view.in_key)?;
        let nonce = build_nonce(self.round, self.layer, self.this_server);
        let plaintext = open(&shared_key, &nonce, view.signed_ciphertext, &view.in_key)?;

        let info = PathEstablishmentInfoView::interpret_from(&plaintext, self.boomerang_length)?;
        let out_token = SignedToken::from_bytes(&info.out_token)?;

        let out_content = token_content(self.round + 1, self.round + 1, self.this_server, &info.out_key);
        if !verify_message(&self.combined_token_key, &out_token, &out_content) {
            return Err(ServerError::Token(TokenError::VerificationFailed));
        }

        let out_hash = out_token.hash();
        let outcome = if self.terminal {
            // The boomerang slot carries the reply through the reconstructed
            // group secret; verify it is signed under the key the client
            // established for this path before staging it for checkpoint.
            if info.boomerang_envelope.len() < 64 {
                return Err(ServerError::CheckpointSignatureInvalid);
            }
            let split = info.boomerang_envelope.len() - 64;
            let mut sig = [0u8; 64];
            sig.copy_from_slice(&info.boomerang_envelope[split..]);
            if !verify_signature(&info.out_key, &info.boomerang_envelope[..split], &sig) {
                return Err(ServerError::CheckpointSignatureInvalid);
            }
            let group = hash_to_index(&out_hash, self.num_groups);
            PathOutcome::Terminal { group }
        } else {
            let next_server = hash_to_index(&out_hash, self.num_servers);
            PathOutcome::Forward {
                next_server,
                next_envelope: {
                    let envelope = duskmesh_core::PathEstablishmentEnvelope {
                        in_key: info.out_key,
                        in_token: info.out_token,
                        signed_ciphertext: info.next_envelope.to_vec(),
                    };
                    envelope.marshal()
                },
            }
        };

        // The record's "next" slot doubles as a server id or a group id
        // depending on whether this is the terminal path layer, matching
        // the field reused for both purposes in a lookup-table record.
        let next_value = match &outcome {
            PathOutcome::Forward { next_server, .. } => *next_server,
            PathOutcome::Terminal { group } => *group,
        };
        let record = self
            .key_table
            .add_key(view.in_key, shared_key, sender, next_value, info.out_key)?;

        Ok(ParsedPath {
            in_key: view.in_key,
            out_key: info.out_key,
            out_token,
            boomerang_envelope: info.boomerang_envelope.to_vec(),
            outcome,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_to_index_stays_in_range() {
        let digest = Sha256::digest(b"some token bytes");
        let d: [u8; 32] = digest.into();
        for _ in 0..50 {
            assert!(hash_to_index(&d, 7) < 7);
        }
    }

    #[test]
    fn hash_to_index_is_deterministic() {
        let digest: [u8; 32] = Sha256::digest(b"fixed").into();
        assert_eq!(hash_to_index(&digest, 5), hash_to_index(&digest, 5));
    }
}
