//! duskmesh CLI
//!
//! Operator launcher for one server process, plus control-plane RPC
//! subcommands standing in for the external coordinator's client half.

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::info;

use duskmesh_daemon::IpcConfig;
use duskmesh_settings::DeploymentConfig;

#[derive(Parser)]
#[command(name = "duskmesh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Socket path for daemon communication.
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server daemon (usually run by a system service; prefer
    /// `duskmesh-serverd` directly in production).
    Serve,

    /// Install a group's combined token key and this server's DH share.
    KeySet {
        group_id: u32,
        /// Hex-encoded 96-byte BLS12-381 combined token public key.
        token_public_key: String,
        /// Hex-encoded 32-byte Edwards-curve group DH share.
        group_share: String,
    },

    /// Configure and begin a round.
    RoundSetup {
        round: u32,
        num_layers: u32,
        bin_size: usize,
        message_size: usize,
        #[arg(long)]
        path_establishment: bool,
        #[arg(long, default_value_t = 0)]
        receipt_layer: u32,
        #[arg(long)]
        no_dummies: bool,
    },

    /// Block until the current round reaches completion.
    RoundStart { round: u32 },

    /// Fetch this round's decrypted final messages.
    GetMessages { round: u32 },

    /// Ping a running daemon.
    HealthCheck,
}

fn socket_path(cli_override: Option<PathBuf>) -> PathBuf {
    cli_override.unwrap_or_else(|| IpcConfig::default().socket_path)
}

async fn call(socket: &PathBuf, method: &str, params: Value) -> Result<Value> {
    let stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("connecting to {}", socket.display()))?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let request = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut line = serde_json::to_vec(&request)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;

    let mut response_line = String::new();
    reader.read_line(&mut response_line).await?;
    let response: Value = serde_json::from_str(&response_line)?;

    if let Some(error) = response.get("error") {
        return Err(anyhow!("rpc error: {error}"));
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}

#[tokio::main]
async fn main() -> Result<()> {
    duskmesh_logging::init();
    let cli = Cli::parse();
    let socket = socket_path(cli.socket);

    match cli.command {
        Commands::Serve => {
            let config = DeploymentConfig::load_or_default()?;
            info!(servers = config.servers.len(), groups = config.groups.len(), "deployment config loaded");
            return Err(anyhow!(
                "`serve` only validates the deployment config; run the duskmesh-serverd binary to actually start a server"
            ));
        }
        Commands::KeySet {
            group_id,
            token_public_key,
            group_share,
        } => {
            let result = call(
                &socket,
                "key_set",
                json!({
                    "group_id": group_id,
                    "token_public_key": token_public_key,
                    "group_share": group_share,
                }),
            )
            .await?;
            print_json(&result);
        }
        Commands::RoundSetup {
            round,
            num_layers,
            bin_size,
            message_size,
            path_establishment,
            receipt_layer,
            no_dummies,
        } => {
            let result = call(
                &socket,
                "round_setup",
                json!({
                    "round": round,
                    "num_layers": num_layers,
                    "bin_size": bin_size,
                    "message_size": message_size,
                    "path_establishment": path_establishment,
                    "receipt_layer": receipt_layer,
                    "no_dummies": no_dummies,
                }),
            )
            .await?;
            print_json(&result);
        }
        Commands::RoundStart { round } => {
            let result = call(&socket, "round_start", json!({ "round": round })).await?;
            print_json(&result);
        }
        Commands::GetMessages { round } => {
            let result = call(&socket, "get_messages", json!({ "round": round })).await?;
            print_json(&result);
        }
        Commands::HealthCheck => {
            let result = call(&socket, "health_check", json!({})).await?;
            print_json(&result);
        }
    }

    Ok(())
}

fn print_json(value: &Value) {
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "{}", serde_json::to_string_pretty(value).unwrap_or_default());
}
