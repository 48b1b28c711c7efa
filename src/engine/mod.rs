pub mod events;
pub mod orchestrator;

pub use events::EventBus;
pub use orchestrator::{AgentConfig, AgentOrchestrator};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::types::ToolInfo;

/// The orchestrator's view of the downstream server: a tool directory and
/// a call method. Implemented over JSON-RPC by
/// [`crate::proxy::RpcToolClient`] and by in-process fakes in tests.
#[async_trait]
pub trait ToolClient: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value>;
}
