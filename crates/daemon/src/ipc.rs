//! JSON-RPC 2.0 over a Unix domain socket: the coordinator's control-plane
//! channel (§6). One line in, one line out; no event stream, since every
//! RPC here (`KeySet`/`RoundSetup`/`RoundStart`/`GetMessages`/`HealthCheck`)
//! is a request/response pair, not a subscription.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{DaemonError, Result};

/// IPC server configuration.
#[derive(Debug, Clone)]
pub struct IpcConfig {
    pub socket_path: PathBuf,
}

impl Default for IpcConfig {
    fn default() -> Self {
        let xdg_runtime = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
        Self {
            socket_path: PathBuf::from(format!("{xdg_runtime}/duskmesh-serverd.sock")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
    pub id: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: serde_json::Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
}

/// Dispatches one JSON-RPC method call. Implemented by [`crate::DaemonRpc`].
pub trait IpcHandler: Send + Sync {
    fn handle(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<serde_json::Value, String>> + Send + '_>>;
}

pub struct IpcServer {
    config: IpcConfig,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl IpcServer {
    pub fn new(config: IpcConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
        }
    }

    pub async fn start<H: IpcHandler + 'static>(&mut self, handler: H) -> Result<()> {
        if self.config.socket_path.exists() {
            std::fs::remove_file(&self.config.socket_path)?;
        }

        let listener = UnixListener::bind(&self.config.socket_path)
            .map_err(|e| DaemonError::Ipc(format!("failed to bind {:?}: {e}", self.config.socket_path)))?;

        info!(socket = ?self.config.socket_path, "ipc server listening");

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let handler = Arc::new(handler);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let handler = handler.clone();
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler).await {
                                    warn!(error = %e, "ipc connection error");
                                }
                            });
                        }
                        Err(e) => error!(error = %e, "ipc accept error"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("ipc server shutting down");
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.config.socket_path);
        Ok(())
    }

    async fn handle_connection<H: IpcHandler + 'static>(stream: UnixStream, handler: Arc<H>) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = match reader.read_line(&mut line).await {
                Ok(n) => n,
                Err(e) => {
                    debug!(error = %e, "ipc read error");
                    break;
                }
            };
            if bytes_read == 0 {
                break;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) if request.jsonrpc != "2.0" => {
                    JsonRpcResponse::error(request.id, -32600, "invalid request: jsonrpc must be \"2.0\"".into())
                }
                Ok(request) => match handler.handle(&request.method, request.params).await {
                    Ok(result) => JsonRpcResponse::success(request.id, result),
                    Err(msg) => JsonRpcResponse::error(request.id, -32000, msg),
                },
                Err(e) => JsonRpcResponse::error(serde_json::Value::Null, -32700, format!("parse error: {e}")),
            };

            let response_str = match serde_json::to_string(&response) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "ipc response serialize error");
                    break;
                }
            };
            if writer.write_all(response_str.as_bytes()).await.is_err()
                || writer.write_all(b"\n").await.is_err()
                || writer.flush().await.is_err()
            {
                break;
            }
        }

        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.config.socket_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_serverd_name() {
        let config = IpcConfig::default();
        assert!(config.socket_path.to_str().unwrap().contains("duskmesh-serverd"));
    }

    #[test]
    fn json_rpc_response_success() {
        let response = JsonRpcResponse::success(serde_json::json!(1), serde_json::json!({"ok": true}));
        assert_eq!(response.jsonrpc, "2.0");
        assert!(response.result.is_some());
        assert!(response.error.is_none());
    }

    #[test]
    fn json_rpc_response_error() {
        let response = JsonRpcResponse::error(serde_json::json!(1), -32600, "bad request".into());
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[test]
    fn parse_request_with_params() {
        let json = r#"{"jsonrpc":"2.0","method":"health_check","params":{},"id":1}"#;
        let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.method, "health_check");
        assert!(request.params.is_some());
    }

    #[test]
    fn parse_missing_method_field_fails() {
        let json = r#"{"jsonrpc":"2.0","id":1}"#;
        let result: std::result::Result<JsonRpcRequest, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn parse_invalid_json_fails() {
        let json = "{not valid json}";
        let result: std::result::Result<JsonRpcRequest, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn wrong_jsonrpc_version_still_parses() {
        let json = r#"{"jsonrpc":"1.0","method":"health_check","id":1}"#;
        let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_ne!(request.jsonrpc, "2.0");
    }

    #[test]
    fn ipc_server_reports_its_socket_path() {
        let config = IpcConfig {
            socket_path: PathBuf::from("/tmp/duskmesh-test.sock"),
        };
        let server = IpcServer::new(config.clone());
        assert_eq!(server.socket_path(), &config.socket_path);
    }
}
