//! The control-plane RPC surface (§6): `KeySet`, `RoundSetup`, `RoundStart`,
//! `GetMessages`, `HealthCheck`. Each method takes hex-encoded byte fields
//! over JSON, since `serde_json` has no native bytes type.

use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use duskmesh_server::{Orchestrator, RoundConfig};
use duskmesh_token::TokenPublicKey;

use crate::ipc::IpcHandler;

fn hex_to_array<const N: usize>(field: &str, s: &str) -> Result<[u8; N], String> {
    let bytes = hex::decode(s).map_err(|e| format!("{field}: invalid hex: {e}"))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| format!("{field}: expected {N} bytes, got {}", v.len()))
}

#[derive(Debug, Deserialize)]
struct KeySetParams {
    group_id: u32,
    token_public_key: String,
    /// This server's share of the group's blind-signature signing key.
    /// Accepted for interface completeness; client-facing token issuance
    /// is out of this daemon's scope, so the share itself is never used
    /// here.
    #[serde(default)]
    #[allow(dead_code)]
    token_key_share: Option<String>,
    /// Accepted alongside `token_public_key` for interface completeness;
    /// this orchestrator only ever consults the combined token key.
    #[serde(default)]
    #[allow(dead_code)]
    group_public_key: Option<String>,
    group_share: String,
}

#[derive(Debug, Deserialize)]
struct RoundSetupParams {
    round: u32,
    num_layers: u32,
    bin_size: usize,
    path_establishment: bool,
    #[serde(default)]
    #[allow(dead_code)]
    last_layer: Option<u32>,
    message_size: usize,
    #[serde(default)]
    #[allow(dead_code)]
    boomerang_limit: Option<u32>,
    #[serde(default)]
    #[allow(dead_code)]
    start_id: Option<u32>,
    #[serde(default)]
    #[allow(dead_code)]
    end_id: Option<u32>,
    #[serde(default)]
    #[allow(dead_code)]
    check: Option<bool>,
    #[serde(default)]
    #[allow(dead_code)]
    interval: Option<u32>,
    #[serde(default)]
    #[allow(dead_code)]
    skip_path_gen: Option<bool>,
    #[serde(default)]
    #[allow(dead_code)]
    next_layer: Option<u32>,
    #[serde(default)]
    receipt_layer: u32,
    #[serde(default)]
    no_dummies: bool,
}

#[derive(Debug, Deserialize)]
struct RoundInfo {
    #[allow(dead_code)]
    round: u32,
}

/// Wraps the shared [`Orchestrator`] and dispatches one JSON-RPC method at
/// a time. Coordinator-scheduling fields accepted in `RoundSetupParams`
/// but not stored in [`RoundConfig`] (`last_layer`, `boomerang_limit`,
/// `start_id`, `end_id`, `check`, `interval`, `skip_path_gen`,
/// `next_layer`) are the multi-round scheduling coordinator's concern, not
/// this per-server orchestrator's.
pub struct DaemonRpc {
    orchestrator: Arc<Orchestrator>,
}

impl DaemonRpc {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    fn key_set(&self, params: Option<Value>) -> Result<Value, String> {
        let params: KeySetParams = serde_json::from_value(params.ok_or("missing params")?)
            .map_err(|e| format!("invalid params: {e}"))?;
        let token_public_key = TokenPublicKey::from_bytes(hex_to_array::<96>(
            "token_public_key",
            &params.token_public_key,
        )?);
        let group_share = hex_to_array::<32>("group_share", &params.group_share)?;
        self.orchestrator
            .key_set(params.group_id, token_public_key, group_share);
        Ok(json!({}))
    }

    fn round_setup(&self, params: Option<Value>) -> Result<Value, String> {
        let params: RoundSetupParams = serde_json::from_value(params.ok_or("missing params")?)
            .map_err(|e| format!("invalid params: {e}"))?;
        self.orchestrator.round_setup(RoundConfig {
            round: params.round,
            num_layers: params.num_layers,
            bin_size: params.bin_size,
            path_establishment: params.path_establishment,
            message_size: params.message_size,
            receipt_layer: params.receipt_layer,
            no_dummies: params.no_dummies,
        });
        Ok(json!({}))
    }

    async fn round_start(&self) -> Result<Value, String> {
        let orchestrator = self.orchestrator.clone();
        tokio::task::spawn_blocking(move || orchestrator.round_start())
            .await
            .map_err(|e| format!("round_start task panicked: {e}"))?;
        Ok(json!({}))
    }

    fn get_messages(&self, params: Option<Value>) -> Result<Value, String> {
        let _: RoundInfo = serde_json::from_value(params.ok_or("missing params")?)
            .map_err(|e| format!("invalid params: {e}"))?;
        let messages: Vec<String> = self
            .orchestrator
            .get_messages()
            .iter()
            .map(hex::encode)
            .collect();
        Ok(json!({ "messages": messages }))
    }

    fn health_check(&self) -> Result<Value, String> {
        Ok(json!({
            "status": "ok",
            "round": self.orchestrator.current_round(),
            "server": self.orchestrator.this_server(),
        }))
    }
}

impl IpcHandler for DaemonRpc {
    fn handle(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Value, String>> + Send + '_>> {
        let method = method.to_string();
        Box::pin(async move {
            match method.as_str() {
                "key_set" => self.key_set(params),
                "round_setup" => self.round_setup(params),
                "round_start" => self.round_start().await,
                "get_messages" => self.get_messages(params),
                "health_check" => self.health_check(),
                other => Err(format!("unknown method: {other}")),
            }
        })
    }
}
