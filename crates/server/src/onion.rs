//! Lightning-round onion parser and router (§4.G): peels one layer off an
//! incoming envelope, marks its bootstrap key used, and re-wraps the
//! decrypted payload for the next hop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use duskmesh_core::{LightningEnvelope, LightningEnvelopeView, ServerId};
use duskmesh_crypto::{build_nonce, open, reverse_layer};
use duskmesh_keytable::{try_mark_used, KeyLookupTable, SharedRecord};
use duskmesh_shuffle::{ShuffleBuffer, Shuffler};

use crate::error::{Result, ServerError};

/// Parses lightning-round envelopes arriving at one layer, in one
/// direction. `reverse = true` processes boomerang traffic, which uses the
/// outgoing half of each bootstrap-key record and a nonce shifted by
/// `num_layers` so a forward ciphertext can never be replayed backwards.
pub struct OnionParser {
    key_table: Arc<KeyLookupTable>,
    round: u32,
    layer: u32,
    num_layers: u32,
    this_server: ServerId,
    reverse: bool,
    used_count: AtomicUsize,
}

impl OnionParser {
    pub fn new(
        key_table: Arc<KeyLookupTable>,
        round: u32,
        layer: u32,
        num_layers: u32,
        this_server: ServerId,
        reverse: bool,
    ) -> Self {
        Self {
            key_table,
            round,
            layer,
            num_layers,
            this_server,
            reverse,
            used_count: AtomicUsize::new(0),
        }
    }

    /// Decrypt one envelope, returning the plaintext payload and a handle
    /// to the bootstrap-key record it was addressed to, so the router can
    /// decide the next hop.
    pub fn authenticated_onion_parse(&self, message: &[u8]) -> Result<(Vec<u8>, SharedRecord)> {
        let view = LightningEnvelopeView::interpret_from(message)?;
        let record = self
            .key_table
            .lookup(&view.lookup_key, self.reverse)
            .ok_or_else(|| duskmesh_keytable::KeyTableError::NotFound(hex::encode(view.lookup_key)))?;

        let nonce_layer = if self.reverse {
            reverse_layer(self.layer, self.num_layers)
        } else {
            self.layer
        };
        let nonce = build_nonce(self.round, nonce_layer, self.this_server);

        let (verification_key, shared_key) = {
            let guard = record.lock().unwrap();
            if self.reverse {
                (guard.outgoing_verification_key, guard.outgoing_shared_key)
            } else {
                (guard.verification_key, guard.shared_key)
            }
        };

        let plaintext = open(&shared_key, &nonce, view.signed_ciphertext, &verification_key)?;

        try_mark_used(&record, &view.lookup_key)?;
        self.used_count.fetch_add(1, Ordering::SeqCst);

        Ok((plaintext, record))
    }

    /// True once every key installed for this layer has been used exactly
    /// once; resets the table's usage bits on success so the layer can be
    /// replayed in a later round.
    pub fn all_keys_accounted_for(&self) -> bool {
        let accounted = self.used_count.load(Ordering::SeqCst) == self.key_table.num_keys();
        if accounted {
            self.key_table.reset_usage();
        }
        accounted
    }
}

/// Re-wraps a parsed onion payload into the envelope the next hop expects
/// and deposits it in that destination's shuffle buffer.
pub struct LightningRouter {
    outgoing_buffers: HashMap<ServerId, Mutex<ShuffleBuffer>>,
    reverse: bool,
}

impl LightningRouter {
    /// `capacities` gives each destination's `(element_length, bin_size)`
    /// for the layer this router feeds into.
    pub fn new(capacities: &[(ServerId, usize, usize)], reverse: bool) -> Self {
        let outgoing_buffers = capacities
            .iter()
            .map(|&(dest, element_length, capacity)| {
                (dest, Mutex::new(ShuffleBuffer::new(element_length, capacity)))
            })
            .collect();
        Self {
            outgoing_buffers,
            reverse,
        }
    }

    /// Pack `decrypted` (the still-opaque inner ciphertext peeled off by
    /// [`OnionParser::authenticated_onion_parse`]) for the hop `record`
    /// points to, and write the marshaled envelope into that destination's
    /// buffer.
    pub fn authenticated_onion_pack(&self, decrypted: Vec<u8>, record: &SharedRecord) -> Result<()> {
        let (lookup_key, dest) = {
            let guard = record.lock().unwrap();
            if self.reverse {
                (guard.verification_key, guard.prev_server)
            } else {
                (guard.outgoing_verification_key, guard.next_server)
            }
        };

        let envelope = LightningEnvelope {
            lookup_key,
            signed_ciphertext: decrypted,
        };
        let marshaled = envelope.marshal();

        let buffer = self
            .outgoing_buffers
            .get(&dest)
            .ok_or(ServerError::UnknownDestination(dest))?;
        buffer.lock().unwrap().write(&marshaled)?;
        Ok(())
    }

    pub fn shuffle_all(&self, shuffler: &Shuffler, with_dummies: bool) {
        for buffer in self.outgoing_buffers.values() {
            buffer.lock().unwrap().shuffle(shuffler, with_dummies);
        }
    }

    pub fn buffer(&self, dest: ServerId) -> Option<&Mutex<ShuffleBuffer>> {
        self.outgoing_buffers.get(&dest)
    }

    pub fn destinations(&self) -> impl Iterator<Item = ServerId> + '_ {
        self.outgoing_buffers.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duskmesh_core::BootstrapKeyRecord;
    use duskmesh_crypto::{seal, SigningKeypair};

    fn table_with_one_key(
        sender: &SigningKeypair,
        prev: ServerId,
        next: ServerId,
    ) -> (Arc<KeyLookupTable>, [u8; 32]) {
        let table = Arc::new(KeyLookupTable::new(
            duskmesh_crypto::EncryptionKeypair::generate(),
        ));
        let vk = sender.public_key_bytes();
        table.add_key(vk, [9u8; 32], prev, next, [2u8; 32]).unwrap();
        (table, vk)
    }

    #[test]
    fn parse_then_accounted_for() {
        let sender = SigningKeypair::generate();
        let (table, vk) = table_with_one_key(&sender, 0, 2);
        let parser = OnionParser::new(table.clone(), 1, 0, 3, 9, false);

        let nonce = build_nonce(1, 0, 9);
        let sealed = seal(&[9u8; 32], &nonce, b"hop payload", &sender);
        let envelope = LightningEnvelope {
            lookup_key: vk,
            signed_ciphertext: sealed,
        };
        let message = envelope.marshal();

        let (plaintext, _record) = parser.authenticated_onion_parse(&message).unwrap();
        assert_eq!(plaintext, b"hop payload");
        assert!(parser.all_keys_accounted_for());
    }

    #[test]
    fn reusing_a_key_is_rejected() {
        let sender = SigningKeypair::generate();
        let (table, vk) = table_with_one_key(&sender, 0, 2);
        let parser = OnionParser::new(table, 1, 0, 3, 9, false);

        let nonce = build_nonce(1, 0, 9);
        let sealed = seal(&[9u8; 32], &nonce, b"once", &sender);
        let envelope = LightningEnvelope {
            lookup_key: vk,
            signed_ciphertext: sealed,
        };
        let message = envelope.marshal();

        parser.authenticated_onion_parse(&message).unwrap();
        let result = parser.authenticated_onion_parse(&message);
        assert!(matches!(result, Err(ServerError::KeyTable(_))));
    }

    #[test]
    fn unknown_lookup_key_errors() {
        let sender = SigningKeypair::generate();
        let (table, _vk) = table_with_one_key(&sender, 0, 2);
        let parser = OnionParser::new(table, 1, 0, 3, 9, false);

        let other = SigningKeypair::generate();
        let nonce = build_nonce(1, 0, 9);
        let sealed = seal(&[1u8; 32], &nonce, b"x", &other);
        let envelope = LightningEnvelope {
            lookup_key: other.public_key_bytes(),
            signed_ciphertext: sealed,
        };

        let result = parser.authenticated_onion_parse(&envelope.marshal());
        assert!(matches!(result, Err(ServerError::KeyTable(_))));
    }

    #[test]
    fn router_packs_toward_next_server() {
        let record = Arc::new(Mutex::new(BootstrapKeyRecord::new(
            [1u8; 32],
            [0u8; 32],
            0,
            5,
            [2u8; 32],
            [0u8; 32],
        )));
        let router = LightningRouter::new(&[(5, 64, 4)], false);
        router
            .authenticated_onion_pack(vec![7u8; 32], &record)
            .unwrap();
        assert_eq!(router.buffer(5).unwrap().lock().unwrap().num_messages(), 1);
    }

    #[test]
    fn router_rejects_unknown_destination() {
        let record = Arc::new(Mutex::new(BootstrapKeyRecord::new(
            [1u8; 32],
            [0u8; 32],
            0,
            9,
            [2u8; 32],
            [0u8; 32],
        )));
        let router = LightningRouter::new(&[(5, 64, 4)], false);
        let result = router.authenticated_onion_pack(vec![1u8; 32], &record);
        assert!(matches!(result, Err(ServerError::UnknownDestination(9))));
    }
}
