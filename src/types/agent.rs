use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{GraphSnapshot, ToolInfo};

pub const DEFAULT_MAX_DEPTH: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Running => "running",
            AgentStatus::Paused => "paused",
            AgentStatus::Completed => "completed",
            AgentStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// One executed (or attempted) tool call in the agent's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub tool_name: String,
    pub node_id: String,
    pub parameters: Value,
    /// Parameter name to the graph node id that supplied its value.
    pub parameter_sources: HashMap<String, String>,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: i64,
    pub depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedTool {
    pub tool: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDependency {
    pub param_name: String,
    pub source_tool: String,
    pub source_field: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Per-tool verdict of the dependency analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyAnalysis {
    pub tool: String,
    #[serde(default)]
    pub required_params: Vec<String>,
    #[serde(default)]
    pub can_execute_without_context: bool,
    #[serde(default)]
    pub suggested_order: u32,
    #[serde(default)]
    pub dependencies: Vec<ParameterDependency>,
}

/// Best-effort parameter mapping for one target tool. All fields default
/// so partial model replies normalize instead of failing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterExtraction {
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
    /// Parameter name to a `"toolName.fieldPath"` source label.
    #[serde(default)]
    pub sources: HashMap<String, String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub missing_params: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextToolDecision {
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    pub status: AgentStatus,
    pub tools: Vec<ToolInfo>,
    pub analysis: Vec<DependencyAnalysis>,
    pub execution_history: Vec<ExecutionStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub current_depth: u32,
    pub max_depth: u32,
    pub flagged_tools: Vec<FlaggedTool>,
    pub graph: GraphSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentState {
    pub fn new(max_depth: u32) -> Self {
        Self {
            status: AgentStatus::Idle,
            tools: Vec::new(),
            analysis: Vec::new(),
            execution_history: Vec::new(),
            current_step: None,
            current_depth: 0,
            max_depth,
            flagged_tools: Vec::new(),
            graph: GraphSnapshot::default(),
            start_time: None,
            end_time: None,
            error: None,
        }
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventType {
    StatusChange,
    AnalysisComplete,
    ToolStart,
    ToolComplete,
    ToolFailed,
    ToolSkipped,
    AgentComplete,
    Error,
    State,
}

impl AgentEventType {
    pub fn as_str(&self) -> &str {
        match self {
            AgentEventType::StatusChange => "status_change",
            AgentEventType::AnalysisComplete => "analysis_complete",
            AgentEventType::ToolStart => "tool_start",
            AgentEventType::ToolComplete => "tool_complete",
            AgentEventType::ToolFailed => "tool_failed",
            AgentEventType::ToolSkipped => "tool_skipped",
            AgentEventType::AgentComplete => "agent_complete",
            AgentEventType::Error => "error",
            AgentEventType::State => "state",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub event_type: AgentEventType,
    pub data: Value,
    pub timestamp: i64,
}

impl AgentEvent {
    pub fn new(event_type: AgentEventType, data: Value) -> Self {
        Self {
            event_type,
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}
