//! Entry point for one mix server process: loads this server's identity
//! and the deployment's config, wires the data plane and control plane
//! together, and runs until `SIGINT`/`SIGTERM`.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use duskmesh_core::AnytrustGroup;
use duskmesh_daemon::{connect_peers, spawn_readers, DaemonError, DaemonRpc, IpcConfig, IpcServer, TlsLayerSender};
use duskmesh_keystore::{default_keystore_dir, load_or_generate_dh_keypair, load_or_generate_signing_keypair};
use duskmesh_network::ConnectionManager;
use duskmesh_server::{Orchestrator, WorkPool};
use duskmesh_settings::DeploymentConfig;
use duskmesh_token::TokenPublicKey;

fn this_server_id() -> Result<u32, DaemonError> {
    std::env::var("DUSKMESH_SERVER_ID")
        .map_err(|_| DaemonError::InvalidRequest("DUSKMESH_SERVER_ID is not set".into()))?
        .parse()
        .map_err(|e| DaemonError::InvalidRequest(format!("DUSKMESH_SERVER_ID: {e}")))
}

/// The master anytrust group's combined blind-signature public key,
/// verified during every path-establishment round (§4.J). Unlike the
/// per-group checkpoint-decryption keys installed later by the `KeySet`
/// RPC, this one has no home in `DeploymentConfig` today, so the
/// coordinator hands it to each server process as an environment variable
/// at provisioning time.
fn combined_token_public_key() -> Result<TokenPublicKey, DaemonError> {
    let hex_str = std::env::var("DUSKMESH_TOKEN_PUBLIC_KEY")
        .map_err(|_| DaemonError::InvalidRequest("DUSKMESH_TOKEN_PUBLIC_KEY is not set".into()))?;
    let bytes = hex::decode(&hex_str).map_err(|e| DaemonError::InvalidRequest(format!("invalid hex: {e}")))?;
    let array: [u8; 96] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| DaemonError::InvalidRequest(format!("expected 96 bytes, got {}", v.len())))?;
    Ok(TokenPublicKey::from_bytes(array))
}

fn keystore_dir() -> PathBuf {
    std::env::var("DUSKMESH_KEYSTORE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_keystore_dir())
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    duskmesh_logging::init();

    let this_server = this_server_id()?;
    let combined_token_key = combined_token_public_key()?;
    let keystore_dir = keystore_dir();

    let config = DeploymentConfig::load_or_default()?;
    let num_servers = config.servers.len().max(1) as u32;
    let groups: Vec<AnytrustGroup> = config
        .groups
        .iter()
        .map(|g| AnytrustGroup {
            gid: g.gid,
            servers: g.servers.clone(),
        })
        .collect();

    let signing_key = Arc::new(load_or_generate_signing_keypair("signing.key")?);
    let dh_key = load_or_generate_dh_keypair("dh.key")?;

    let orchestrator = Orchestrator::new(this_server, num_servers, groups, dh_key, combined_token_key);

    let manager = Arc::new(ConnectionManager::new());
    let sender = Arc::new(TlsLayerSender::new(manager.clone(), signing_key, orchestrator.clone()));
    orchestrator.set_sender(sender);

    let pool = Arc::new(WorkPool::new(WorkPool::default_worker_count(), orchestrator.clone()));

    if !config.servers.is_empty() {
        connect_peers(&config, this_server, &keystore_dir, manager.clone()).await?;
        spawn_readers(&config, this_server, manager.clone(), orchestrator.clone(), pool.clone())?;
    }

    let rpc = DaemonRpc::new(orchestrator.clone());
    let mut ipc_server = IpcServer::new(IpcConfig::default());

    info!(server = this_server, "duskmesh-serverd starting");

    tokio::select! {
        result = ipc_server.start(rpc) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "ipc server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            ipc_server.stop().await;
        }
    }

    Ok(())
}
