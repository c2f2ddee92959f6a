use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use duskmesh_core::{BootstrapKeyRecord, ServerId};
use duskmesh_crypto::EncryptionKeypair;
use hex::encode as hex_encode;

use crate::error::KeyTableError;

/// A single bootstrap-key record shared between the forward and reverse
/// tables, so marking it used is visible from either lookup direction.
pub type SharedRecord = Arc<Mutex<BootstrapKeyRecord>>;

/// Per-layer key lookup table: forward map keyed by the incoming lookup
/// key, reverse map keyed by the outgoing one, both populated at
/// path-establishment time and consulted on every lightning-round parse.
pub struct KeyLookupTable {
    table: Mutex<HashMap<[u8; 32], SharedRecord>>,
    reverse_table: Mutex<HashMap<[u8; 32], SharedRecord>>,
    server_secret: EncryptionKeypair,
}

impl KeyLookupTable {
    pub fn new(server_secret: EncryptionKeypair) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            reverse_table: Mutex::new(HashMap::new()),
            server_secret,
        }
    }

    /// Install a new bootstrap key. Computes the outgoing shared key via
    /// `server_secret.diffie_hellman(outgoing_verification_key)`. Rejects
    /// an incoming lookup key already present in the forward table.
    pub fn add_key(
        &self,
        verification_key: [u8; 32],
        shared_key: [u8; 32],
        prev_server: ServerId,
        next_server: ServerId,
        outgoing_verification_key: [u8; 32],
    ) -> Result<SharedRecord, KeyTableError> {
        let mut table = self.table.lock().unwrap();
        if table.contains_key(&verification_key) {
            return Err(KeyTableError::Duplicate(hex_encode(verification_key)));
        }

        let outgoing_shared_key = self
            .server_secret
            .diffie_hellman(&outgoing_verification_key)
            .map_err(|e| KeyTableError::InvalidKey(e.to_string()))?;
        let record = BootstrapKeyRecord::new(
            verification_key,
            shared_key,
            prev_server,
            next_server,
            outgoing_verification_key,
            outgoing_shared_key,
        );
        let shared = Arc::new(Mutex::new(record));

        table.insert(verification_key, shared.clone());
        drop(table);
        self.reverse_table
            .lock()
            .unwrap()
            .insert(outgoing_verification_key, shared.clone());

        Ok(shared)
    }

    pub fn lookup(&self, key: &[u8; 32], reverse: bool) -> Option<SharedRecord> {
        if reverse {
            self.reverse_table.lock().unwrap().get(key).cloned()
        } else {
            self.table.lock().unwrap().get(key).cloned()
        }
    }

    pub fn num_keys(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    pub fn revoke_key(&self, key: &[u8; 32]) {
        self.table.lock().unwrap().remove(key);
    }

    /// Clear the one-shot `used` flag on every forward-table entry at the
    /// start of a new round.
    pub fn reset_usage(&self) {
        for record in self.table.lock().unwrap().values() {
            record.lock().unwrap().used = false;
        }
    }
}

/// Atomically check-and-set a record's one-shot `used` flag, returning
/// `DuplicateError` on reuse within the same layer.
pub fn try_mark_used(record: &SharedRecord, lookup_key: &[u8; 32]) -> Result<(), KeyTableError> {
    let mut guard = record.lock().unwrap();
    if guard.used {
        return Err(KeyTableError::Duplicate(hex_encode(lookup_key)));
    }
    guard.used = true;
    Ok(())
}
