//! Mutual-TLS mesh setup and the per-peer reader tasks that turn framed
//! wire chunks into [`Job`]s for the worker pool (§4.E, §5).
//!
//! Connection establishment follows `should_dial`: the lower-id server in
//! a pair dials, the higher-id server accepts. Since a freshly-accepted
//! TLS stream doesn't on its own reveal which configured peer dialed it,
//! the dialer writes its own 4-byte little-endian server id immediately
//! after the handshake completes, and the acceptor reads it before
//! registering the stream — a small addition the TLS layer itself doesn't
//! need to know about.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls_pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use duskmesh_core::{MessageType, ServerId};
use duskmesh_crypto::{ExpandedVerificationKey, SigningKeypair};
use duskmesh_network::{accept, client_config, dial, server_config, should_dial, ConnectionManager, NetworkError, PeerStream};
use duskmesh_server::{Job, LayerSender, Orchestrator, WorkPool};
use duskmesh_settings::DeploymentConfig;

use crate::{DaemonError, Result};

fn identity_cert_path(keystore_dir: &Path) -> PathBuf {
    keystore_dir.join("identity_cert.pem")
}

fn identity_key_path(keystore_dir: &Path) -> PathBuf {
    keystore_dir.join("identity_key.pem")
}

/// Deployment configs carry each peer's Ed25519 signing and DH key material but no
/// certificate path; this daemon expects the coordinator to have dropped
/// one PEM cert per server into the keystore directory under this name.
fn peer_cert_path(keystore_dir: &Path, peer: ServerId) -> PathBuf {
    keystore_dir.join(format!("server_{peer}_cert.pem"))
}

async fn write_peer_id(stream: &mut PeerStream, id: ServerId) -> std::result::Result<(), NetworkError> {
    stream.write_all(&id.to_le_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_peer_id(stream: &mut PeerStream) -> std::result::Result<ServerId, NetworkError> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await?;
    Ok(ServerId::from_le_bytes(buf))
}

/// Dials every lower-id peer and accepts from every higher-id peer in
/// `config`, populating `manager` with one outgoing and/or incoming stream
/// per peer. Runs the accept loop as a detached background task; returns
/// once every outgoing dial has completed.
pub async fn connect_peers(
    config: &DeploymentConfig,
    this_server: ServerId,
    keystore_dir: &Path,
    manager: Arc<ConnectionManager>,
) -> Result<()> {
    let this_record = config
        .server_for(this_server)
        .ok_or_else(|| DaemonError::InvalidRequest(format!("no server record for id {this_server}")))?;
    let identity_cert = identity_cert_path(keystore_dir);
    let identity_key = identity_key_path(keystore_dir);

    let listen_addr: SocketAddr = this_record
        .address
        .parse()
        .map_err(|e| DaemonError::InvalidRequest(format!("invalid address {}: {e}", this_record.address)))?;

    let peer_certs: Vec<PathBuf> = config
        .servers
        .iter()
        .filter(|s| s.id != this_server)
        .map(|s| peer_cert_path(keystore_dir, s.id))
        .collect();
    let server_cfg = server_config(&identity_cert, &identity_key, &peer_certs)?;

    let listener = TcpListener::bind(listen_addr).await?;
    info!(addr = %listen_addr, "data plane listening");

    let accept_manager = manager.clone();
    tokio::spawn(async move {
        loop {
            match accept(&listener, server_cfg.clone()).await {
                Ok((mut stream, addr)) => {
                    let manager = accept_manager.clone();
                    tokio::spawn(async move {
                        match read_peer_id(&mut stream).await {
                            Ok(peer_id) => {
                                info!(peer = peer_id, %addr, "accepted data plane peer");
                                manager.insert_incoming(peer_id, stream).await;
                            }
                            Err(e) => warn!(%addr, error = %e, "failed to identify incoming peer"),
                        }
                    });
                }
                Err(e) => error!(error = %e, "data plane accept error"),
            }
        }
    });

    for server in &config.servers {
        if server.id == this_server || !should_dial(this_server, server.id) {
            continue;
        }
        let addr: SocketAddr = server
            .address
            .parse()
            .map_err(|e| DaemonError::InvalidRequest(format!("invalid address {}: {e}", server.address)))?;
        let peer_cert = peer_cert_path(keystore_dir, server.id);
        let client_cfg = client_config(&identity_cert, &identity_key, &peer_cert)?;
        let server_name = ServerName::IpAddress(addr.ip().into());

        let mut stream = dial(addr, client_cfg, server_name).await?;
        write_peer_id(&mut stream, this_server).await?;
        info!(peer = server.id, %addr, "dialed data plane peer");
        manager.insert_outgoing(server.id, stream).await;
    }

    Ok(())
}

/// Spawns one reader task per configured peer. Each task blocks on
/// `read_from_dynamic` (the uniform reader: a lightning layer's frame is
/// always `bin_size` messages, a path-establishment layer's frame is
/// however many were actually written — `num_messages` in the header
/// covers both), checks the delivery into the layer synchronizer, then
/// fans the frame's individual messages out to the worker pool.
pub fn spawn_readers(
    config: &DeploymentConfig,
    this_server: ServerId,
    manager: Arc<ConnectionManager>,
    orchestrator: Arc<Orchestrator>,
    pool: Arc<WorkPool>,
) -> Result<()> {
    let mut verifying_keys = HashMap::new();
    for server in &config.servers {
        if server.id == this_server {
            continue;
        }
        let raw = hex::decode(&server.identity)
            .map_err(|e| DaemonError::InvalidRequest(format!("server {}: bad identity hex: {e}", server.id)))?;
        let raw: [u8; 32] = raw
            .try_into()
            .map_err(|_| DaemonError::InvalidRequest(format!("server {}: identity must be 32 bytes", server.id)))?;
        let expanded = ExpandedVerificationKey::expand(&raw)
            .map_err(|e| DaemonError::InvalidRequest(format!("server {}: bad verification key: {e}", server.id)))?;
        verifying_keys.insert(server.id, expanded);
    }

    for (&peer, verifying_key) in verifying_keys.iter() {
        let verifying_key = verifying_key.clone();
        let manager = manager.clone();
        let orchestrator = orchestrator.clone();
        let pool = pool.clone();

        tokio::spawn(async move {
            loop {
                let message_size = orchestrator.message_size().max(1);
                match manager.read_from_dynamic(peer, message_size, &verifying_key).await {
                    Ok((header, payload)) => {
                        if let Err(e) = orchestrator.sync_once(header.layer, header.sender) {
                            warn!(peer, layer = header.layer, error = %e, "rejected frame at synchronizer");
                            continue;
                        }
                        let message_type = match MessageType::from_u32(header.message_type) {
                            Ok(t) => t,
                            Err(e) => {
                                warn!(peer, error = %e, "dropping frame with unknown message type");
                                orchestrator.layer_done();
                                continue;
                            }
                        };
                        for chunk in payload.chunks(message_size) {
                            pool.submit(Job {
                                message_type,
                                round: header.round,
                                layer: header.layer,
                                sender: header.sender,
                                group: header.group,
                                payload: chunk.to_vec(),
                            });
                        }
                        orchestrator.layer_done();
                    }
                    Err(e) => {
                        warn!(peer, error = %e, "data plane reader exiting");
                        break;
                    }
                }
            }
        });
    }

    Ok(())
}

/// The orchestrator's [`LayerSender`]: bridges a synchronous shuffle-buffer
/// drain to the async `ConnectionManager::send_to`, spawning the actual
/// write onto the current Tokio runtime rather than blocking the
/// synchronizer callback that invoked it.
pub struct TlsLayerSender {
    manager: Arc<ConnectionManager>,
    signing_key: Arc<SigningKeypair>,
    orchestrator: Arc<Orchestrator>,
    handle: tokio::runtime::Handle,
}

impl TlsLayerSender {
    pub fn new(
        manager: Arc<ConnectionManager>,
        signing_key: Arc<SigningKeypair>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            manager,
            signing_key,
            orchestrator,
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl LayerSender for TlsLayerSender {
    fn send(
        &self,
        dest: ServerId,
        message_type: MessageType,
        round: u32,
        layer: u32,
        group: duskmesh_core::GroupId,
        payload: Vec<u8>,
    ) {
        let message_size = self.orchestrator.message_size().max(1);
        let num_messages = (payload.len() / message_size) as u32;
        let header = duskmesh_core::MetadataHeader {
            num_messages,
            message_type: message_type as u32,
            round,
            layer,
            sender: self.orchestrator.this_server(),
            dest,
            group,
        };

        let manager = self.manager.clone();
        let signing_key = self.signing_key.clone();
        self.handle.spawn(async move {
            if let Err(e) = manager.send_to(dest, &header, &payload, &signing_key).await {
                error!(dest, round, layer, error = %e, "data plane send failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_cert_path_is_scoped_under_keystore_dir() {
        let dir = Path::new("/tmp/duskmesh-keys");
        let path = peer_cert_path(dir, 3);
        assert_eq!(path, dir.join("server_3_cert.pem"));
    }

    #[test]
    fn identity_paths_are_scoped_under_keystore_dir() {
        let dir = Path::new("/tmp/duskmesh-keys");
        assert_eq!(identity_cert_path(dir), dir.join("identity_cert.pem"));
        assert_eq!(identity_key_path(dir), dir.join("identity_key.pem"));
    }
}
