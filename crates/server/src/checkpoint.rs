//! Checkpoint sender and anytrust-group responder (§4.I): reconstructs the
//! per-path group-shared secret from every member's partial contribution
//! and uses it to decrypt the boomerang staged at the terminal path layer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use duskmesh_core::{
    token_content, CheckpointRequest, CheckpointResponse, FinalLightningMessageView, GroupId,
    ServerId,
};
use duskmesh_crypto::{edwards_scalar_multiply, edwards_sum_points, open, verify_signature};
use duskmesh_keytable::SharedRecord;
use duskmesh_shuffle::ShuffleBuffer;
use duskmesh_token::{verify_message, SignedToken, TokenError, TokenPublicKey};

use crate::error::{Result, ServerError};

/// Tracks which anonymous verification keys are expected to respond for
/// the current round, and one-shot-marks each as it reports in. Used both
/// by the responder side (checking tokens) and the final trustee-message
/// handler (checking decryption signatures).
pub struct VerificationKeyTable {
    keys: Mutex<HashMap<[u8; 32], bool>>,
    count: AtomicUsize,
}

impl VerificationKeyTable {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            count: AtomicUsize::new(0),
        }
    }

    pub fn add(&self, key: [u8; 32]) {
        self.keys.lock().unwrap().insert(key, false);
    }

    pub fn get_and_mark(&self, key: &[u8; 32]) -> Result<()> {
        let mut guard = self.keys.lock().unwrap();
        match guard.get_mut(key) {
            None => Err(duskmesh_keytable::KeyTableError::NotFound(hex::encode(key)).into()),
            Some(used) if *used => {
                Err(duskmesh_keytable::KeyTableError::Duplicate(hex::encode(key)).into())
            }
            Some(used) => {
                *used = true;
                self.count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    pub fn reset(&self) {
        let mut guard = self.keys.lock().unwrap();
        for used in guard.values_mut() {
            *used = false;
        }
        self.count.store(0, Ordering::SeqCst);
    }

    pub fn all_accounted_for(&self) -> bool {
        self.count.load(Ordering::SeqCst) == self.keys.lock().unwrap().len()
    }
}

impl Default for VerificationKeyTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The responder half run by every server that belongs to a group: checks
/// an incoming checkpoint token and returns this member's partial
/// contribution toward the path's group secret.
pub struct CheckpointResponder {
    combined_token_key: TokenPublicKey,
    group_share: [u8; 32],
    num_layers: u32,
}

impl CheckpointResponder {
    pub fn new(combined_token_key: TokenPublicKey, group_share: [u8; 32], num_layers: u32) -> Self {
        Self {
            combined_token_key,
            group_share,
            num_layers,
        }
    }

    /// Verify `request`'s token was issued for this group's checkpoint
    /// round and return this member's partial multiplication.
    pub fn handle_checkpoint_request(
        &self,
        sender: ServerId,
        request: &CheckpointRequest,
    ) -> Result<CheckpointResponse> {
        let token = SignedToken::from_bytes(&request.token)?;
        let content = token_content(
            self.num_layers,
            self.num_layers,
            sender,
            &request.anonymous_verification_key,
        );
        if !verify_message(&self.combined_token_key, &token, &content) {
            return Err(ServerError::Token(TokenError::VerificationFailed));
        }

        let partial_point =
            edwards_scalar_multiply(&self.group_share, &request.anonymous_verification_key)
                .map_err(|_| ServerError::CheckpointSignatureInvalid)?;

        Ok(CheckpointResponse {
            lookup_key: request.anonymous_verification_key,
            partial_point,
        })
    }
}

struct PendingPath {
    sealed_boomerang: Vec<u8>,
    record: SharedRecord,
    partials: Vec<[u8; 32]>,
}

/// The requester half: one instance per anytrust group this server routes
/// paths through. Collects checkpoint requests into a shuffle buffer,
/// accumulates each group member's partial response, and decrypts once
/// every member has answered.
pub struct CheckpointSender {
    group: GroupId,
    group_size: usize,
    requests: Mutex<ShuffleBuffer>,
    pending: Mutex<HashMap<[u8; 32], PendingPath>>,
    decrypted: Mutex<Vec<(Vec<u8>, SharedRecord)>>,
}

impl CheckpointSender {
    pub fn new(group: GroupId, group_size: usize, capacity: usize) -> Self {
        Self {
            group,
            group_size,
            requests: Mutex::new(ShuffleBuffer::new(CheckpointRequest::LEN, capacity)),
            pending: Mutex::new(HashMap::new()),
            decrypted: Mutex::new(Vec::new()),
        }
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Stage one terminal-layer path for checkpoint decryption.
    pub fn add_reverse_message(
        &self,
        anonymous_verification_key: [u8; 32],
        token: [u8; 48],
        sealed_boomerang: Vec<u8>,
        record: SharedRecord,
    ) -> Result<()> {
        let request = CheckpointRequest {
            anonymous_verification_key,
            token,
        };
        self.requests.lock().unwrap().write(&request.marshal())?;
        self.pending.lock().unwrap().insert(
            anonymous_verification_key,
            PendingPath {
                sealed_boomerang,
                record,
                partials: Vec::with_capacity(self.group_size),
            },
        );
        Ok(())
    }

    pub fn shuffle_requests(&self, shuffler: &duskmesh_shuffle::Shuffler) {
        self.requests.lock().unwrap().shuffle(shuffler, false);
    }

    pub fn request_buffer(&self) -> &Mutex<ShuffleBuffer> {
        &self.requests
    }

    /// Record one member's partial response. Once every expected member
    /// has responded for this path, combines the shares and decrypts the
    /// staged boomerang. Partial accumulation for a single path is
    /// serialized by this sender's own lock; distinct groups never
    /// contend with each other.
    pub fn collect_partial(&self, response: CheckpointResponse) -> Result<()> {
        let mut guard = self.pending.lock().unwrap();
        let pending = guard
            .get_mut(&response.lookup_key)
            .ok_or_else(|| duskmesh_keytable::KeyTableError::NotFound(hex::encode(response.lookup_key)))?;
        pending.partials.push(response.partial_point);

        if pending.partials.len() == self.group_size {
            let pending = guard.remove(&response.lookup_key).unwrap();
            drop(guard);
            let combined = edwards_sum_points(&pending.partials)
                .map_err(|_| ServerError::CheckpointSignatureInvalid)?;
            let plaintext = open(
                &combined,
                &duskmesh_crypto::build_nonce(0, 0, self.group),
                &pending.sealed_boomerang,
                &response.lookup_key,
            )?;
            self.decrypted.lock().unwrap().push((plaintext, pending.record));
        }
        Ok(())
    }

    /// Drain every boomerang this round finished decrypting.
    pub fn take_decrypted(&self) -> Vec<(Vec<u8>, SharedRecord)> {
        std::mem::take(&mut self.decrypted.lock().unwrap())
    }
}

/// Handles a terminal `FinalLightningMessage` from the last anytrust
/// group: verifies its signature under its own claimed anonymous key and
/// records the decrypted payload as one of this round's final outputs.
pub fn handle_trustee_message(
    keys: &VerificationKeyTable,
    message: &[u8],
    out: &mut Vec<Vec<u8>>,
) -> Result<()> {
    let view = FinalLightningMessageView::interpret_from(message)?;
    keys.get_and_mark(&view.anonymous_verification_key)?;
    if !verify_signature(&view.anonymous_verification_key, view.message, &view.signature) {
        return Err(ServerError::CheckpointSignatureInvalid);
    }
    out.push(view.message.to_vec());
    Ok(())
}
