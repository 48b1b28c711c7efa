use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::engine::ToolClient;
use crate::types::ToolInfo;

use super::jsonrpc;
use super::transport::Transport;

/// JSON-RPC client over a [`Transport`], used when the agent drives the
/// downstream server directly instead of shadowing an operator's client.
/// A background task routes responses to waiting callers by id.
pub struct RpcToolClient {
    transport: Arc<dyn Transport>,
    pending: Arc<Mutex<HashMap<String, tokio::sync::oneshot::Sender<Value>>>>,
    next_id: AtomicI64,
}

impl RpcToolClient {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        let client = Arc::new(Self {
            transport: transport.clone(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicI64::new(1),
        });

        let pending = client.pending.clone();
        tokio::spawn(async move {
            loop {
                match transport.recv().await {
                    Some(message) => {
                        if !jsonrpc::is_response(&message) {
                            debug!("ignoring non-response message from server");
                            continue;
                        }
                        let key = jsonrpc::message_id(&message)
                            .map(jsonrpc::id_key)
                            .unwrap_or_default();
                        if let Some(waiter) = pending.lock().unwrap().remove(&key) {
                            let _ = waiter.send(message);
                        }
                    }
                    None => {
                        // Dropping the waiters wakes every in-flight request
                        // with a closed-connection error.
                        pending.lock().unwrap().clear();
                        break;
                    }
                }
            }
        });

        client
    }

    /// Performs the `initialize` handshake expected by MCP servers.
    pub async fn initialize(&self) -> Result<Value> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {
                        "name": "mcpscope",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;
        self.transport
            .send(jsonrpc::notification("notifications/initialized"))
            .await?;
        Ok(result)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let key = jsonrpc::id_key(&json!(id));
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.pending.lock().unwrap().insert(key.clone(), tx);

        if let Err(e) = self
            .transport
            .send(jsonrpc::request(id, method, params))
            .await
        {
            self.pending.lock().unwrap().remove(&key);
            return Err(e);
        }

        let reply = rx
            .await
            .map_err(|_| anyhow!("connection closed before response to {method}"))?;
        if let Some(error) = reply.get("error") {
            bail!("{method} failed: {error}");
        }
        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ToolClient for RpcToolClient {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result.get("tools").cloned().unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(tools)?)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        self.request(
            "tools/call",
            json!({"name": name, "arguments": arguments}),
        )
        .await
    }
}
