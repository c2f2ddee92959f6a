//! Per-round state machine (§4.K): `IDLE → SETUP → FORWARDING(0..L-1) →
//! TERMINAL → {CHECKPOINT → REVERSING(L-1..receipt_layer) → DONE | TRUSTEE
//! → DONE}`. Grounded on `server.go`'s `Server` struct and its
//! `OnThreshold` synchronizer callback, adapted to the already-built
//! onion/path/checkpoint modules instead of re-deriving their logic here.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use duskmesh_core::{
    AnytrustGroup, CheckpointRequest, CheckpointResponse, GroupId, MessageType, ServerId, MASTER_GROUP,
};
use duskmesh_crypto::EncryptionKeypair;
use duskmesh_keytable::KeyLookupTable;
use duskmesh_shuffle::{ShuffleBuffer, Shuffler};
use duskmesh_sync::{Synchronizer, SynchronizerCallback};
use duskmesh_token::TokenPublicKey;
use tracing::{error, info};

use crate::checkpoint::{CheckpointResponder, CheckpointSender, VerificationKeyTable};
use crate::error::{Result, ServerError};
use crate::onion::{LightningRouter, OnionParser};
use crate::path_establishment::{PathEstablishmentParser, PathOutcome};
use crate::pool::{Job, JobHandler, JobMeta};

/// Parameters carried by the coordinator's `RoundSetup` RPC (§6).
#[derive(Debug, Clone)]
pub struct RoundConfig {
    pub round: u32,
    pub num_layers: u32,
    pub bin_size: usize,
    pub path_establishment: bool,
    pub message_size: usize,
    pub receipt_layer: u32,
    /// §9 open question: kept as an explicit field with a secure default
    /// rather than a compile-time constant.
    pub no_dummies: bool,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            round: 0,
            num_layers: 1,
            bin_size: 0,
            path_establishment: false,
            message_size: 0,
            receipt_layer: 0,
            no_dummies: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Idle,
    Setup,
    Forwarding(u32),
    Terminal,
    Checkpoint,
    Reversing(u32),
    Trustee,
    Done,
}

/// Everything the synchronizer callback needs to allocate the next layer's
/// parser/router and decide the next phase. One instance lives for exactly
/// one round; `Orchestrator::round_setup` installs a fresh one.
struct RoundState {
    config: RoundConfig,
    phase: RoundPhase,
    this_server: ServerId,
    num_servers: u32,
    groups: Vec<AnytrustGroup>,
    server_secret: EncryptionKeypair,
    combined_token_key: TokenPublicKey,
    /// One key table per forward layer, indexed by layer number.
    key_tables: Vec<Arc<KeyLookupTable>>,
    onion_parser: Option<Arc<OnionParser>>,
    onion_router: Option<Arc<LightningRouter>>,
    path_parser: Option<Arc<PathEstablishmentParser>>,
    path_router: Option<Arc<PathRouter>>,
    checkpoint_senders: HashMap<GroupId, Arc<CheckpointSender>>,
    checkpoint_responders: HashMap<GroupId, Arc<CheckpointResponder>>,
    /// This server's share of each group's combined token key and DH
    /// secret, installed once by the coordinator's `KeySet` RPC and
    /// outliving any single round; `checkpoint_responders` is rebuilt from
    /// this on every `round_setup` because the responder's token-content
    /// domain separator is tied to that round's `num_layers`.
    group_keys: HashMap<GroupId, (TokenPublicKey, [u8; 32])>,
    trustee_keys: VerificationKeyTable,
    final_messages: Vec<Vec<u8>>,
    shuffler: Shuffler,
}

impl RoundState {
    fn allocate_forward_layer(&mut self, layer: u32) {
        let terminal = self.config.path_establishment && layer + 1 == self.config.num_layers;
        let key_table = Arc::new(KeyLookupTable::new(self.server_secret.clone()));
        self.key_tables.push(key_table.clone());

        if self.config.path_establishment {
            self.path_parser = Some(Arc::new(PathEstablishmentParser::new(
                key_table,
                self.server_secret.clone(),
                self.combined_token_key,
                self.config.round,
                layer,
                self.this_server,
                self.num_servers,
                self.groups.len() as u32,
                self.config.message_size,
                terminal,
            )));
            // The terminal path layer hands off to the checkpoint senders
            // instead of forwarding, so it needs no router of its own.
            self.path_router = if terminal {
                None
            } else {
                let capacities: Vec<(ServerId, usize, usize)> = (0..self.num_servers)
                    .map(|dest| (dest, self.config.message_size, self.config.bin_size))
                    .collect();
                Some(Arc::new(PathRouter::new(&capacities)))
            };
        } else {
            self.onion_parser = Some(Arc::new(OnionParser::new(
                key_table,
                self.config.round,
                layer,
                self.config.num_layers,
                self.this_server,
                false,
            )));
            let capacities: Vec<(ServerId, usize, usize)> = (0..self.num_servers)
                .map(|dest| (dest, self.config.message_size, self.config.bin_size))
                .collect();
            self.onion_router = Some(Arc::new(LightningRouter::new(&capacities, false)));
        }
    }

    fn allocate_reverse_layer(&mut self, layer: u32) {
        let key_table = self.key_tables[layer as usize].clone();
        self.onion_parser = Some(Arc::new(OnionParser::new(
            key_table,
            self.config.round,
            layer,
            self.config.num_layers,
            self.this_server,
            true,
        )));
        let capacities: Vec<(ServerId, usize, usize)> = (0..self.num_servers)
            .map(|dest| (dest, self.config.message_size, self.config.bin_size))
            .collect();
        self.onion_router = Some(Arc::new(LightningRouter::new(&capacities, true)));
    }
}

/// Forwards a parsed path-establishment envelope toward the next server a
/// token's hash designates, analogous to [`LightningRouter`] but carrying
/// already re-marshaled `PathEstablishmentEnvelope` bytes rather than a
/// decrypted payload this crate re-wraps itself.
struct PathRouter {
    outgoing_buffers: HashMap<ServerId, Mutex<ShuffleBuffer>>,
}

impl PathRouter {
    fn new(capacities: &[(ServerId, usize, usize)]) -> Self {
        let outgoing_buffers = capacities
            .iter()
            .map(|&(dest, element_length, capacity)| {
                (dest, Mutex::new(ShuffleBuffer::new(element_length, capacity)))
            })
            .collect();
        Self { outgoing_buffers }
    }

    fn send(&self, dest: ServerId, envelope: &[u8]) -> Result<()> {
        let buffer = self
            .outgoing_buffers
            .get(&dest)
            .ok_or(ServerError::UnknownDestination(dest))?;
        buffer.lock().unwrap().write(envelope)?;
        Ok(())
    }

    fn shuffle_all(&self, shuffler: &Shuffler) {
        for buffer in self.outgoing_buffers.values() {
            // Path envelopes never carry synthetic dummies; every token was
            // issued against a real client request.
            buffer.lock().unwrap().shuffle(shuffler, false);
        }
    }

    fn destinations(&self) -> impl Iterator<Item = ServerId> + '_ {
        self.outgoing_buffers.keys().copied()
    }

    fn buffer(&self, dest: ServerId) -> Option<&Mutex<ShuffleBuffer>> {
        self.outgoing_buffers.get(&dest)
    }
}

/// Streams one already-shuffled destination buffer's full byte payload to
/// its peer (§4.E). The server crate owns padding/permutation/chunking;
/// the actual mutual-TLS transport is the daemon's concern, injected here
/// so this crate stays free of any socket/async dependency.
pub trait LayerSender: Send + Sync + 'static {
    #[allow(clippy::too_many_arguments)]
    fn send(
        &self,
        dest: ServerId,
        message_type: MessageType,
        round: u32,
        layer: u32,
        group: GroupId,
        payload: Vec<u8>,
    );
}

fn drain_buffer(buffer: &Mutex<ShuffleBuffer>) -> Vec<u8> {
    let mut guard = buffer.lock().unwrap();
    let mut out = vec![0u8; guard.len_bytes()];
    let mut written = 0;
    loop {
        let n = guard.read_next_chunk(&mut out[written..]).unwrap_or(0);
        if n == 0 {
            break;
        }
        written += n;
    }
    out
}

/// Owns the current round's state and drives its transitions from inside
/// the layer synchronizer's exclusive callback (§5: "the callback runs
/// under an exclusive lock and is the sole mutator of current_layer").
pub struct Orchestrator {
    state: Mutex<RoundState>,
    synchronizer: Arc<Synchronizer>,
    round_complete: Mutex<bool>,
    round_complete_cond: Condvar,
    sender: Mutex<Option<Arc<dyn LayerSender>>>,
}

impl Orchestrator {
    pub fn new(
        this_server: ServerId,
        num_servers: u32,
        groups: Vec<AnytrustGroup>,
        server_secret: EncryptionKeypair,
        combined_token_key: TokenPublicKey,
    ) -> Arc<Self> {
        let state = RoundState {
            config: RoundConfig::default(),
            phase: RoundPhase::Idle,
            this_server,
            num_servers,
            groups,
            server_secret,
            combined_token_key,
            key_tables: Vec::new(),
            onion_parser: None,
            onion_router: None,
            path_parser: None,
            path_router: None,
            checkpoint_senders: HashMap::new(),
            checkpoint_responders: HashMap::new(),
            group_keys: HashMap::new(),
            trustee_keys: VerificationKeyTable::new(),
            final_messages: Vec::new(),
            shuffler: Shuffler::from_entropy(),
        };

        Arc::new_cyclic(|weak: &std::sync::Weak<Orchestrator>| {
            let synchronizer = Arc::new(Synchronizer::new(0, 0, num_servers as usize, {
                let weak = weak.clone();
                Some(Box::new(ThresholdCallback { orchestrator: weak }))
            }));
            Orchestrator {
                state: Mutex::new(state),
                synchronizer,
                round_complete: Mutex::new(true),
                round_complete_cond: Condvar::new(),
                sender: Mutex::new(None),
            }
        })
    }

    /// Installs the transport that layer-transition buffers stream through
    /// once shuffled. Set once, at daemon startup.
    pub fn set_sender(&self, sender: Arc<dyn LayerSender>) {
        *self.sender.lock().unwrap() = Some(sender);
    }

    fn stream(
        &self,
        message_type: MessageType,
        round: u32,
        layer: u32,
        dest: ServerId,
        group: GroupId,
        payload: Vec<u8>,
    ) {
        if let Some(sender) = self.sender.lock().unwrap().clone() {
            sender.send(dest, message_type, round, layer, group, payload);
        }
    }

    /// The round number currently installed by `round_setup`; used by the
    /// daemon crate to address outgoing frames and size incoming ones.
    pub fn current_round(&self) -> u32 {
        self.state.lock().unwrap().config.round
    }

    /// The fixed per-element envelope length for the current round; the
    /// daemon crate needs this to frame outgoing chunks and to derive
    /// incoming payload lengths from a header's `num_messages`.
    pub fn message_size(&self) -> usize {
        self.state.lock().unwrap().config.message_size
    }

    pub fn this_server(&self) -> ServerId {
        self.state.lock().unwrap().this_server
    }

    /// Blocks until the synchronizer's barrier has reached `layer`, then
    /// marks `sender` as having delivered for it (§4.F). Called once per
    /// inbound frame, before its messages are queued as jobs.
    pub fn sync_once(&self, layer: u32, sender: ServerId) -> Result<()> {
        self.synchronizer.sync_once(layer, sender as usize)?;
        Ok(())
    }

    /// Reset all round state and begin `FORWARDING(0)` (or path layer 0).
    pub fn round_setup(&self, config: RoundConfig) {
        let num_servers;
        {
            let mut state = self.state.lock().unwrap();
            state.config = config.clone();
            state.phase = RoundPhase::Setup;
            state.key_tables.clear();
            state.onion_parser = None;
            state.onion_router = None;
            state.path_parser = None;
            state.path_router = None;
            state.checkpoint_senders.clear();
            state.final_messages.clear();
            state.trustee_keys.reset();
            state.checkpoint_responders = state
                .group_keys
                .iter()
                .map(|(&group, &(combined_token_key, group_share))| {
                    (
                        group,
                        Arc::new(CheckpointResponder::new(combined_token_key, group_share, config.num_layers)),
                    )
                })
                .collect();
            state.allocate_forward_layer(0);
            state.phase = RoundPhase::Forwarding(0);
            num_servers = state.num_servers;
        }
        *self.round_complete.lock().unwrap() = false;
        self.synchronizer.reset(config.round, 0, num_servers as usize);
        info!(round = config.round, "round setup complete, forwarding layer 0");
    }

    /// Blocks the caller (the coordinator's `RoundStart` RPC handler) until
    /// this round reaches `Done`.
    pub fn round_start(&self) {
        let guard = self.round_complete.lock().unwrap();
        let _ = self
            .round_complete_cond
            .wait_while(guard, |done| !*done)
            .unwrap();
    }

    pub fn is_round_complete(&self) -> bool {
        *self.round_complete.lock().unwrap()
    }

    pub fn get_messages(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().final_messages.clone()
    }

    pub fn current_phase(&self) -> RoundPhase {
        self.state.lock().unwrap().phase
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    pub fn onion_parser(&self) -> Option<Arc<OnionParser>> {
        self.state.lock().unwrap().onion_parser.clone()
    }

    pub fn onion_router(&self) -> Option<Arc<LightningRouter>> {
        self.state.lock().unwrap().onion_router.clone()
    }

    pub fn path_parser(&self) -> Option<Arc<PathEstablishmentParser>> {
        self.state.lock().unwrap().path_parser.clone()
    }

    fn path_router(&self) -> Option<Arc<PathRouter>> {
        self.state.lock().unwrap().path_router.clone()
    }

    /// Number of members in `group`, or 1 if the round was set up without
    /// any anytrust groups (the trivial single-server test configuration).
    fn group_size(&self, group: GroupId) -> usize {
        self.state
            .lock()
            .unwrap()
            .groups
            .iter()
            .find(|g| g.gid == group)
            .map(|g| g.size())
            .unwrap_or(1)
    }

    /// Registers an anonymous verification key as one this round expects a
    /// trustee message from, mirroring the Go original's
    /// `AnonymousSigningKeys.Add` call made when a checkpoint request for
    /// that key is first accepted.
    pub fn register_trustee_key(&self, key: [u8; 32]) {
        self.state.lock().unwrap().trustee_keys.add(key);
    }

    pub fn install_checkpoint_responder(&self, group: GroupId, responder: CheckpointResponder) {
        self.state
            .lock()
            .unwrap()
            .checkpoint_responders
            .insert(group, Arc::new(responder));
    }

    /// The coordinator's `KeySet` RPC (§6): installs this server's share of
    /// `group`'s combined token key and DH secret. Takes effect starting
    /// with the next `round_setup`, which rebuilds the checkpoint
    /// responder against that round's `num_layers`.
    pub fn key_set(&self, group: GroupId, combined_token_key: TokenPublicKey, group_share: [u8; 32]) {
        self.state
            .lock()
            .unwrap()
            .group_keys
            .insert(group, (combined_token_key, group_share));
    }

    pub fn checkpoint_responder(&self, group: GroupId) -> Option<Arc<CheckpointResponder>> {
        self.state.lock().unwrap().checkpoint_responders.get(&group).cloned()
    }

    pub fn checkpoint_sender(&self, group: GroupId, group_size: usize) -> Arc<CheckpointSender> {
        let mut state = self.state.lock().unwrap();
        state
            .checkpoint_senders
            .entry(group)
            .or_insert_with(|| Arc::new(CheckpointSender::new(group, group_size, state.config.bin_size)))
            .clone()
    }

    /// Records a terminal `FinalLightningMessage` accepted by the trustee
    /// handler, under the round's output lock.
    pub fn push_final_message(&self, message: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        crate::checkpoint::handle_trustee_message(&state.trustee_keys, &message, &mut Vec::new())?;
        state.final_messages.push(message);
        Ok(())
    }

    /// The worker's single call-in point at the end of processing one
    /// message: advances the synchronizer, which triggers `on_threshold`
    /// once every expected sender has checked in for the current layer.
    pub fn layer_done(&self) {
        self.synchronizer.done();
    }

    fn on_threshold(&self, completed_layer: u32) -> (usize, u32) {
        let mut state = self.state.lock().unwrap();
        let num_servers = state.num_servers as usize;

        match state.phase {
            RoundPhase::Forwarding(layer) => {
                if let Some(parser) = &state.onion_parser {
                    if !parser.all_keys_accounted_for() {
                        error!(
                            round = state.config.round,
                            layer, "layer complete but not every key was used, aborting round"
                        );
                    }
                }
                let forward_type = if state.config.path_establishment {
                    MessageType::PathForward
                } else {
                    MessageType::LightningForward
                };
                let mut outgoing: Vec<(ServerId, Vec<u8>)> = Vec::new();
                if let Some(router) = state.onion_router.clone() {
                    router.shuffle_all(&state.shuffler, !state.config.no_dummies);
                    outgoing.extend(
                        router
                            .destinations()
                            .filter_map(|dest| router.buffer(dest).map(|b| (dest, drain_buffer(b)))),
                    );
                }
                if let Some(router) = state.path_router.clone() {
                    router.shuffle_all(&state.shuffler);
                    outgoing.extend(
                        router
                            .destinations()
                            .filter_map(|dest| router.buffer(dest).map(|b| (dest, drain_buffer(b)))),
                    );
                }
                let round = state.config.round;
                let next_layer = layer + 1;
                drop(state);
                for (dest, payload) in outgoing {
                    self.stream(forward_type, round, next_layer, dest, MASTER_GROUP, payload);
                }
                state = self.state.lock().unwrap();

                if next_layer >= state.config.num_layers {
                    state.phase = RoundPhase::Terminal;
                    info!(round = state.config.round, "forwarding complete, entering terminal phase");
                    if state.config.path_establishment {
                        // A path-establishment round's job ends at the
                        // terminal layer: boomerangs are now staged with
                        // the checkpoint senders, to be reconstructed on
                        // whatever later round the coordinator issues a
                        // checkpoint sweep for. Nothing further to
                        // synchronize here, so the round itself is done.
                        state.phase = RoundPhase::Done;
                        drop(state);
                        self.mark_round_complete();
                        return (0, completed_layer);
                    } else {
                        state.phase = RoundPhase::Checkpoint;
                        (state.groups.len().max(1), completed_layer)
                    }
                } else {
                    state.allocate_forward_layer(next_layer);
                    state.phase = RoundPhase::Forwarding(next_layer);
                    info!(round = state.config.round, layer = next_layer, "advanced to next forward layer");
                    (num_servers, next_layer)
                }
            }
            RoundPhase::Checkpoint => {
                state.phase = RoundPhase::Reversing(state.config.num_layers - 1);
                let layer = state.config.num_layers - 1;
                state.allocate_reverse_layer(layer);
                info!(round = state.config.round, "checkpoint complete, reversing from top layer");
                (num_servers, layer)
            }
            RoundPhase::Reversing(layer) => {
                let mut outgoing: Vec<(ServerId, Vec<u8>)> = Vec::new();
                if let Some(router) = state.onion_router.clone() {
                    router.shuffle_all(&state.shuffler, !state.config.no_dummies);
                    outgoing.extend(
                        router
                            .destinations()
                            .filter_map(|dest| router.buffer(dest).map(|b| (dest, drain_buffer(b)))),
                    );
                }
                let round = state.config.round;
                let prev_layer = layer.saturating_sub(1);
                drop(state);
                for (dest, payload) in outgoing {
                    self.stream(MessageType::LightningReverse, round, prev_layer, dest, MASTER_GROUP, payload);
                }
                state = self.state.lock().unwrap();

                if layer == state.config.receipt_layer {
                    state.phase = RoundPhase::Done;
                    info!(round = state.config.round, "reversing complete, round done");
                    drop(state);
                    self.mark_round_complete();
                    (0, completed_layer)
                } else {
                    let prev = layer - 1;
                    state.allocate_reverse_layer(prev);
                    state.phase = RoundPhase::Reversing(prev);
                    (num_servers, prev)
                }
            }
            RoundPhase::Trustee => {
                state.phase = RoundPhase::Done;
                drop(state);
                self.mark_round_complete();
                (0, completed_layer)
            }
            _ => (num_servers, completed_layer),
        }
    }

    fn mark_round_complete(&self) {
        *self.round_complete.lock().unwrap() = true;
        self.round_complete_cond.notify_all();
    }
}

struct ThresholdCallback {
    orchestrator: std::sync::Weak<Orchestrator>,
}

impl SynchronizerCallback for ThresholdCallback {
    fn on_threshold(&self, completed_layer: u32) -> (usize, u32) {
        match self.orchestrator.upgrade() {
            Some(orchestrator) => orchestrator.on_threshold(completed_layer),
            // The orchestrator outlives every synchronizer reference it
            // hands out; this arm only matters during teardown.
            None => (0, completed_layer),
        }
    }
}

/// Dispatches one [`Job`] pulled off the worker pool to whichever
/// parser/router/checkpoint handler the job's message type and the round's
/// current phase call for (§4.K). Each arm mirrors the hand-off chain the
/// onion/path/checkpoint modules were built to support, rather than
/// re-implementing any of their logic here.
impl JobHandler for Orchestrator {
    fn handle(&self, job: Job) -> Result<Option<Vec<u8>>> {
        match job.message_type {
            MessageType::LightningForward | MessageType::LightningReverse => {
                let parser = self.onion_parser().ok_or(ServerError::NotReady)?;
                let router = self.onion_router().ok_or(ServerError::NotReady)?;
                let (plaintext, record) = parser.authenticated_onion_parse(&job.payload)?;
                router.authenticated_onion_pack(plaintext, &record)?;
                Ok(None)
            }
            MessageType::PathForward => {
                let parser = self.path_parser().ok_or(ServerError::NotReady)?;
                let parsed = parser.parse_record_and_get_next(job.sender, &job.payload)?;
                match parsed.outcome {
                    PathOutcome::Forward {
                        next_server,
                        next_envelope,
                    } => {
                        let router = self.path_router().ok_or(ServerError::NotReady)?;
                        router.send(next_server, &next_envelope)?;
                    }
                    PathOutcome::Terminal { group } => {
                        self.register_trustee_key(parsed.out_key);
                        let sender = self.checkpoint_sender(group, self.group_size(group));
                        sender.add_reverse_message(
                            parsed.out_key,
                            parsed.out_token.to_bytes(),
                            parsed.boomerang_envelope,
                            parsed.record,
                        )?;
                    }
                }
                Ok(None)
            }
            MessageType::CheckpointToken => {
                let responder = self
                    .checkpoint_responder(job.group)
                    .ok_or(ServerError::NotReady)?;
                let request = CheckpointRequest::interpret_from(&job.payload)?;
                let response = responder.handle_checkpoint_request(job.sender, &request)?;
                Ok(Some(response.marshal()))
            }
            MessageType::CheckpointSignature => {
                let sender = self.checkpoint_sender(job.group, self.group_size(job.group));
                let response = CheckpointResponse::interpret_from(&job.payload)?;
                sender.collect_partial(response)?;
                for (plaintext, _record) in sender.take_decrypted() {
                    self.push_final_message(plaintext)?;
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn route_response(&self, meta: JobMeta, response: Vec<u8>) {
        self.stream(
            MessageType::CheckpointSignature,
            meta.round,
            meta.layer,
            meta.sender,
            meta.group,
            response,
        );
    }
}
