//! Server daemon: binds a [`duskmesh_server::Orchestrator`] to the
//! control-plane RPC surface (§6) and to the mutual-TLS data plane (§4.E).
//!
//! ## Components
//!
//! - **ipc**: hand-rolled JSON-RPC 2.0 over a Unix domain socket, the
//!   coordinator's control channel.
//! - **rpc**: the `IpcHandler` implementation dispatching `KeySet`/
//!   `RoundSetup`/`RoundStart`/`GetMessages`/`HealthCheck`.
//! - **datapath**: the `LayerSender` implementation and per-peer reader
//!   tasks that turn framed chunks into worker-pool jobs.

mod datapath;
mod ipc;
mod rpc;

pub use datapath::{connect_peers, spawn_readers, TlsLayerSender};
pub use ipc::{IpcConfig, IpcHandler, IpcServer};
pub use rpc::DaemonRpc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("ipc error: {0}")]
    Ipc(String),

    #[error("server error: {0}")]
    Server(#[from] duskmesh_server::ServerError),

    #[error("network error: {0}")]
    Network(#[from] duskmesh_network::NetworkError),

    #[error("settings error: {0}")]
    Settings(#[from] duskmesh_settings::SettingsError),

    #[error("keystore error: {0}")]
    Keystore(#[from] duskmesh_keystore::KeystoreError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_message() {
        let e = DaemonError::InvalidRequest("bad hex".into());
        assert_eq!(e.to_string(), "invalid request: bad hex");
    }

    #[test]
    fn ipc_error_message() {
        let e = DaemonError::Ipc("bind failed".into());
        assert_eq!(e.to_string(), "ipc error: bind failed");
    }
}
