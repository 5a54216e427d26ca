//! Async JSON-RPC client over a spawned tool-server process.

use crate::errors::*;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

/// Per-call deadline, matching the server's own request timeout.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Value,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// How to launch the tool server child process.
#[derive(Debug, Clone)]
pub struct ServerCommand {
    pub program: PathBuf,
    pub data_dir: PathBuf,
}

/// JSON-RPC 2.0 client speaking one request per line over the child's
/// stdio. Calls are sequential; the voice flows never overlap tool calls.
pub struct ToolClient {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl ToolClient {
    /// Spawn the server and wire up its pipes.
    pub async fn spawn(command: &ServerCommand) -> Result<Self> {
        info!(program = ?command.program, "Spawning tool server");
        let mut child = Command::new(&command.program)
            .env("VISAGE_DATA_DIR", &command.data_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Client(format!("failed to spawn server: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Client("server stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VoiceError::Client("server stdout unavailable".into()))?;

        Ok(Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 1,
        })
    }

    /// One round trip. Tool-level errors (`{status:"error", ...}`) are
    /// returned as values for the caller to branch on; protocol errors and
    /// timeouts are `Err`.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "Tool call");

        let mut line = serde_json::to_string(&request)
            .map_err(|e| VoiceError::Protocol(e.to_string()))?;
        line.push('\n');

        let exchange = async {
            self.stdin.write_all(line.as_bytes()).await?;
            self.stdin.flush().await?;

            let mut response_line = String::new();
            let read = self.reader.read_line(&mut response_line).await?;
            if read == 0 {
                return Err(VoiceError::Client("server closed its stdout".into()));
            }
            Ok(response_line)
        };

        let response_line = tokio::time::timeout(CALL_TIMEOUT, exchange)
            .await
            .map_err(|_| VoiceError::Timeout {
                seconds: CALL_TIMEOUT.as_secs(),
            })??;

        let response: RpcResponse = serde_json::from_str(&response_line)
            .map_err(|e| VoiceError::Protocol(format!("bad response: {}", e)))?;

        if response.id != json!(id) {
            return Err(VoiceError::Protocol(format!(
                "response id mismatch: sent {}, got {}",
                id, response.id
            )));
        }
        if let Some(error) = response.error {
            return Err(VoiceError::Protocol(format!(
                "rpc error {}: {}",
                error.code, error.message
            )));
        }
        response
            .result
            .ok_or_else(|| VoiceError::Protocol("response had neither result nor error".into()))
    }

    // ------------------------------------------------------------------
    // Typed tool wrappers
    // ------------------------------------------------------------------

    pub async fn recognize_face(
        &mut self,
        access_token: &str,
        image_data: &str,
        confidence_threshold: f32,
    ) -> Result<Value> {
        self.call(
            "recognize_face",
            json!({
                "access_token": access_token,
                "image_data": image_data,
                "confidence_threshold": confidence_threshold,
            }),
        )
        .await
    }

    pub async fn register_user(
        &mut self,
        access_token: &str,
        name: &str,
        image_data: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Value> {
        self.call(
            "register_user",
            json!({
                "access_token": access_token,
                "name": name,
                "image_data": image_data,
                "metadata": metadata,
            }),
        )
        .await
    }

    pub async fn get_user_profile(&mut self, access_token: &str, user_id: &str) -> Result<Value> {
        self.call(
            "get_user_profile",
            json!({"access_token": access_token, "user_id": user_id}),
        )
        .await
    }

    pub async fn list_users(
        &mut self,
        access_token: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Value> {
        self.call(
            "list_users",
            json!({"access_token": access_token, "limit": limit, "offset": offset}),
        )
        .await
    }

    pub async fn update_user(
        &mut self,
        access_token: &str,
        user_id: &str,
        name: Option<&str>,
        metadata: Option<&BTreeMap<String, String>>,
    ) -> Result<Value> {
        let mut params = json!({"access_token": access_token, "user_id": user_id});
        if let Some(name) = name {
            params["name"] = json!(name);
        }
        if let Some(metadata) = metadata {
            params["metadata"] = json!(metadata);
        }
        self.call("update_user", params).await
    }

    pub async fn delete_user(&mut self, access_token: &str, user_id: &str) -> Result<Value> {
        self.call(
            "delete_user",
            json!({"access_token": access_token, "user_id": user_id}),
        )
        .await
    }

    pub async fn get_database_stats(&mut self, access_token: &str) -> Result<Value> {
        self.call("get_database_stats", json!({"access_token": access_token}))
            .await
    }

    pub async fn get_health_status(&mut self, access_token: &str) -> Result<Value> {
        self.call("get_health_status", json!({"access_token": access_token}))
            .await
    }

    /// Close the server's stdin and wait for it to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        drop(self.stdin);
        let _ = self.child.wait().await;
        Ok(())
    }
}
