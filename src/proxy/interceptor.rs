use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use crate::indexer::ResourceIndexer;
use crate::store::ProfileStore;

use super::jsonrpc;
use super::transport::Transport;

#[derive(Debug, Clone)]
struct PendingRequest {
    method: String,
    tool_name: Option<String>,
}

/// Full-duplex bridge between an operator's client and a downstream tool
/// server. Requests and responses are forwarded untouched; the
/// interceptor only watches them go by, pairs responses with requests by
/// id, and feeds `tools/call` results to the resource indexer under the
/// active profile.
pub struct ProxyInterceptor {
    client: Arc<dyn Transport>,
    server: Arc<dyn Transport>,
    indexer: Arc<ResourceIndexer>,
    profiles: Arc<ProfileStore>,
    pending: Mutex<HashMap<String, PendingRequest>>,
}

impl ProxyInterceptor {
    pub fn new(
        client: Arc<dyn Transport>,
        server: Arc<dyn Transport>,
        indexer: Arc<ResourceIndexer>,
        profiles: Arc<ProfileStore>,
    ) -> Self {
        Self {
            client,
            server,
            indexer,
            profiles,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Pumps messages in both directions until either side closes, then
    /// closes the other side and clears the correlation table.
    pub async fn run(&self) {
        loop {
            tokio::select! {
                message = self.client.recv() => match message {
                    Some(message) => self.handle_client_message(message).await,
                    None => break,
                },
                message = self.server.recv() => match message {
                    Some(message) => self.handle_server_message(message).await,
                    None => break,
                },
            }
        }
        self.shutdown().await;
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    async fn handle_client_message(&self, message: Value) {
        let request_key = if jsonrpc::is_request(&message) {
            let id = jsonrpc::message_id(&message).cloned().unwrap_or(Value::Null);
            let method = jsonrpc::message_method(&message).unwrap_or_default().to_string();
            let tool_name = (method == "tools/call")
                .then(|| {
                    message
                        .pointer("/params/name")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .flatten();
            let key = jsonrpc::id_key(&id);
            self.pending
                .lock()
                .unwrap()
                .insert(key.clone(), PendingRequest { method, tool_name });
            Some((key, id))
        } else {
            None
        };

        if let Err(e) = self.server.send(message).await {
            warn!(error = %e, "failed to forward request to server");
            if let Some((key, id)) = request_key {
                self.pending.lock().unwrap().remove(&key);
                if !self.client.is_closed() {
                    let reply = jsonrpc::error_response(
                        id,
                        jsonrpc::ERROR_UPSTREAM_SEND,
                        &e.to_string(),
                        Value::String(e.to_string()),
                    );
                    if let Err(e) = self.client.send(reply).await {
                        warn!(error = %e, "failed to report send error to client");
                    }
                }
            }
        }
    }

    async fn handle_server_message(&self, message: Value) {
        if jsonrpc::is_response(&message) {
            let key = jsonrpc::message_id(&message)
                .map(jsonrpc::id_key)
                .unwrap_or_default();
            let pending = self.pending.lock().unwrap().remove(&key);
            if let Some(pending) = pending {
                if pending.method == "tools/call" {
                    if let Some(result) = message.get("result") {
                        let tool = pending.tool_name.as_deref().unwrap_or("unknown");
                        let profile = self.profiles.active_profile();
                        let added = self.indexer.index_response(profile.as_ref(), tool, result);
                        if !added.is_empty() {
                            debug!(tool, count = added.len(), "indexed proxied tool result");
                        }
                    }
                }
            }
        }

        if let Err(e) = self.client.send(message).await {
            warn!(error = %e, "failed to forward response to client");
        }
    }

    async fn shutdown(&self) {
        self.pending.lock().unwrap().clear();
        if !self.server.is_closed() {
            self.server.close().await;
        }
        if !self.client.is_closed() {
            self.client.close().await;
        }
    }
}
