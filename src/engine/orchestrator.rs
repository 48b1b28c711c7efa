use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::graph::ResourceGraph;
use crate::providers::LlmClient;
use crate::types::{
    AgentEvent, AgentEventType, AgentState, AgentStatus, ExecutionStep, FlaggedTool, StepStatus,
    ToolInfo, DEFAULT_MAX_DEPTH,
};

use super::{EventBus, ToolClient};

#[derive(Clone)]
pub struct AgentConfig {
    pub llm: LlmClient,
    pub tools: Arc<dyn ToolClient>,
    pub max_depth: u32,
}

impl AgentConfig {
    pub fn new(llm: LlmClient, tools: Arc<dyn ToolClient>) -> Self {
        Self {
            llm,
            tools,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Depth-bounded autonomous driver: discovers tools, lets the LLM pick
/// the next call and fill its parameters from accumulated context, and
/// records every outcome in its own resource graph.
///
/// Each orchestrator owns its state and graph exclusively, and a single
/// loop task drives a run at a time. `pause()` lets the in-flight step
/// drain; a resumed loop waits on the previous task's handle before it
/// touches shared state. `start()` and `stop()` advance a generation
/// counter so a superseded task's late replies are discarded.
pub struct AgentOrchestrator {
    state: Mutex<AgentState>,
    graph: Mutex<ResourceGraph>,
    config: Mutex<Option<AgentConfig>>,
    executed: Mutex<Vec<String>>,
    tool_depths: Mutex<HashMap<String, u32>>,
    cancelled: AtomicBool,
    generation: AtomicU64,
    run_task: Mutex<Option<JoinHandle<()>>>,
    events: EventBus,
}

impl AgentOrchestrator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AgentState::default()),
            graph: Mutex::new(ResourceGraph::new()),
            config: Mutex::new(None),
            executed: Mutex::new(Vec::new()),
            tool_depths: Mutex::new(HashMap::new()),
            cancelled: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            run_task: Mutex::new(None),
            events: EventBus::new(),
        }
    }

    /// Sets (or replaces) the provider and tool callbacks. May be called
    /// repeatedly while the agent is idle.
    pub fn configure(&self, config: AgentConfig) {
        self.state.lock().unwrap().max_depth = config.max_depth;
        *self.config.lock().unwrap() = Some(config);
    }

    pub fn is_configured(&self) -> bool {
        self.config.lock().unwrap().is_some()
    }

    pub fn status(&self) -> AgentStatus {
        self.state.lock().unwrap().status
    }

    /// Current state with a fresh graph snapshot folded in.
    pub fn state(&self) -> AgentState {
        let mut state = self.state.lock().unwrap().clone();
        state.graph = self.graph.lock().unwrap().snapshot();
        state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    /// Subscription plus a synthetic `state` event carrying the current
    /// snapshot, so late subscribers can catch up.
    pub fn subscribe_with_state(&self) -> (AgentEvent, broadcast::Receiver<AgentEvent>) {
        let receiver = self.events.subscribe();
        let snapshot = AgentEvent::new(
            AgentEventType::State,
            serde_json::to_value(self.state()).unwrap_or(Value::Null),
        );
        (snapshot, receiver)
    }

    pub fn start(self: &Arc<Self>) -> Result<()> {
        let Some(config) = self.config.lock().unwrap().clone() else {
            bail!("agent is not configured");
        };
        {
            let mut state = self.state.lock().unwrap();
            if matches!(state.status, AgentStatus::Running | AgentStatus::Paused) {
                bail!("agent is already running");
            }
            *state = AgentState::new(config.max_depth);
            state.status = AgentStatus::Running;
            state.start_time = Some(Utc::now().timestamp_millis());
        }
        self.graph.lock().unwrap().reset();
        self.executed.lock().unwrap().clear();
        self.tool_depths.lock().unwrap().clear();
        self.cancelled.store(false, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.emit_status(AgentStatus::Running);
        let this = self.clone();
        let handle = tokio::spawn(async move { this.run(config, false, generation, None).await });
        *self.run_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// The in-flight tool call completes; the loop parks at its next
    /// iteration boundary.
    pub fn pause(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.status != AgentStatus::Running {
                bail!("agent is not running");
            }
            state.status = AgentStatus::Paused;
        }
        self.emit_status(AgentStatus::Paused);
        Ok(())
    }

    pub fn resume(self: &Arc<Self>) -> Result<()> {
        let Some(config) = self.config.lock().unwrap().clone() else {
            bail!("agent is not configured");
        };
        {
            let mut state = self.state.lock().unwrap();
            if state.status != AgentStatus::Paused {
                bail!("agent is not paused");
            }
            state.status = AgentStatus::Running;
        }
        self.emit_status(AgentStatus::Running);

        // Hand the paused task's handle to the new one; it waits for the
        // drain before entering the loop, so only one task ever runs it.
        let previous = self.run_task.lock().unwrap().take();
        let generation = self.generation.load(Ordering::SeqCst);
        let this = self.clone();
        let handle =
            tokio::spawn(async move { this.run(config, true, generation, previous).await });
        *self.run_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Aborts the run. In-flight LLM or tool calls are abandoned; any
    /// reply that still arrives is discarded.
    pub fn stop(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.lock().unwrap();
            state.status = AgentStatus::Idle;
            state.current_step = None;
            state.end_time = Some(Utc::now().timestamp_millis());
        }
        self.emit_status(AgentStatus::Idle);
    }

    /// Whether the task spawned with `generation` is still the one
    /// entitled to drive the loop and mutate shared state.
    fn is_live(&self, generation: u64) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run(
        self: Arc<Self>,
        config: AgentConfig,
        resuming: bool,
        generation: u64,
        previous: Option<JoinHandle<()>>,
    ) {
        if let Some(previous) = previous {
            let _ = previous.await;
        }
        if !self.is_live(generation) {
            return;
        }
        if let Err(e) = self.run_inner(&config, resuming, generation).await {
            if !self.is_live(generation) {
                return;
            }
            warn!(error = %e, "agent run failed");
            {
                let mut state = self.state.lock().unwrap();
                state.status = AgentStatus::Error;
                state.error = Some(e.to_string());
                state.current_step = None;
                state.end_time = Some(Utc::now().timestamp_millis());
            }
            self.emit_status(AgentStatus::Error);
            self.events
                .publish(AgentEventType::Error, json!({"message": e.to_string()}));
        }
    }

    async fn run_inner(
        &self,
        config: &AgentConfig,
        resuming: bool,
        generation: u64,
    ) -> Result<()> {
        if !resuming {
            let tools = config.tools.list_tools().await?;
            if !self.is_live(generation) {
                return Ok(());
            }
            info!(count = tools.len(), "discovered tools");
            self.state.lock().unwrap().tools = tools.clone();

            let analysis = config.llm.analyze_tool_dependencies(&tools).await;
            if !self.is_live(generation) {
                return Ok(());
            }
            self.state.lock().unwrap().analysis = analysis.clone();
            self.events.publish(
                AgentEventType::AnalysisComplete,
                json!({"analysis": analysis}),
            );
        }
        let tools = self.state.lock().unwrap().tools.clone();

        loop {
            if !self.is_live(generation) {
                return Ok(());
            }
            if self.status() != AgentStatus::Running {
                return Ok(());
            }

            let context = self.graph.lock().unwrap().available_context();
            let executed = self.executed.lock().unwrap().clone();
            let (current_depth, max_depth) = {
                let state = self.state.lock().unwrap();
                (state.current_depth, state.max_depth)
            };

            let decision = config
                .llm
                .select_next_tool(&tools, &executed, &context, current_depth, max_depth)
                .await;
            if !self.is_live(generation) {
                return Ok(());
            }
            if self.status() == AgentStatus::Paused {
                return Ok(());
            }

            let Some(tool_name) = decision.tool else {
                info!(reason = %decision.reason, "agent loop finished");
                break;
            };
            if executed.contains(&tool_name) {
                continue;
            }
            self.executed.lock().unwrap().push(tool_name.clone());
            let Some(tool) = tools.iter().find(|t| t.name == tool_name) else {
                warn!(tool = %tool_name, "selected tool is not in the catalog");
                continue;
            };

            self.execute_tool(config, tool, &context, max_depth, generation)
                .await;
        }

        if !self.is_live(generation) {
            return Ok(());
        }
        let totals = {
            let mut state = self.state.lock().unwrap();
            if state.status != AgentStatus::Running {
                return Ok(());
            }
            state.status = AgentStatus::Completed;
            state.current_step = None;
            state.end_time = Some(Utc::now().timestamp_millis());
            json!({
                "totalSteps": state.execution_history.len(),
                "completed": state
                    .execution_history
                    .iter()
                    .filter(|s| s.status == StepStatus::Completed)
                    .count(),
                "failed": state
                    .execution_history
                    .iter()
                    .filter(|s| s.status == StepStatus::Failed)
                    .count(),
                "flagged": state.flagged_tools.len(),
            })
        };
        self.emit_status(AgentStatus::Completed);
        self.events.publish(AgentEventType::AgentComplete, totals);
        Ok(())
    }

    async fn execute_tool(
        &self,
        config: &AgentConfig,
        tool: &ToolInfo,
        context: &serde_json::Map<String, Value>,
        max_depth: u32,
        generation: u64,
    ) {
        let tool_name = tool.name.clone();
        let node_id = self.graph.lock().unwrap().add_pending_tool(&tool_name);
        self.state.lock().unwrap().current_step = Some(tool_name.clone());

        let extraction = config.llm.extract_parameters(tool, context).await;
        if !self.is_live(generation) {
            return;
        }

        if !extraction.missing_params.is_empty() && extraction.confidence < 0.5 {
            self.flag_tool(
                &tool_name,
                &node_id,
                "Could not resolve required parameters from available context",
                &extraction.missing_params,
            );
            return;
        }

        // A tool's depth is one past the deepest tool that feeds it. The
        // first recorded depth per tool name sticks.
        let tool_depth = {
            let depths = self.tool_depths.lock().unwrap();
            let deepest_source = extraction
                .sources
                .values()
                .map(|label| {
                    let source_tool = label.split('.').next().unwrap_or(label);
                    depths.get(source_tool).copied().unwrap_or(0)
                })
                .max()
                .unwrap_or(0);
            1 + deepest_source
        };
        self.tool_depths
            .lock()
            .unwrap()
            .entry(tool_name.clone())
            .or_insert(tool_depth);
        if tool_depth > max_depth {
            self.flag_tool(
                &tool_name,
                &node_id,
                &format!("Exceeds max depth ({tool_depth} > {max_depth})"),
                &[],
            );
            return;
        }

        let resolved_sources: HashMap<String, String> = {
            let graph = self.graph.lock().unwrap();
            extraction
                .sources
                .iter()
                .filter_map(|(param, label)| {
                    let source_tool = label.split('.').next().unwrap_or(label);
                    graph
                        .node_id_for_tool(source_tool)
                        .map(|id| (param.clone(), id))
                })
                .collect()
        };

        let parameters = Value::Object(extraction.params.clone());
        let step_index = {
            let mut state = self.state.lock().unwrap();
            state.current_depth = state.current_depth.max(tool_depth);
            state.execution_history.push(ExecutionStep {
                tool_name: tool_name.clone(),
                node_id: node_id.clone(),
                parameters: parameters.clone(),
                parameter_sources: resolved_sources.clone(),
                status: StepStatus::Running,
                result: None,
                error: None,
                timestamp: Utc::now().timestamp_millis(),
                depth: tool_depth,
            });
            state.execution_history.len() - 1
        };
        self.graph
            .lock()
            .unwrap()
            .mark_tool_running(&node_id, &parameters);
        self.events.publish(
            AgentEventType::ToolStart,
            json!({
                "tool": tool_name,
                "nodeId": node_id,
                "parameters": parameters,
                "depth": tool_depth,
            }),
        );

        let outcome = config.tools.call_tool(&tool_name, parameters).await;
        if !self.is_live(generation) {
            return;
        }

        match outcome {
            Ok(result) => {
                {
                    let mut state = self.state.lock().unwrap();
                    if let Some(step) = state.execution_history.get_mut(step_index) {
                        step.status = StepStatus::Completed;
                        step.result = Some(result.clone());
                    }
                    state.current_step = None;
                }
                self.graph.lock().unwrap().record_tool_execution(
                    &node_id,
                    &result,
                    &resolved_sources,
                );
                self.events.publish(
                    AgentEventType::ToolComplete,
                    json!({"tool": tool_name, "nodeId": node_id, "result": result}),
                );
            }
            Err(e) => {
                let message = e.to_string();
                warn!(tool = %tool_name, error = %message, "tool call failed");
                {
                    let mut state = self.state.lock().unwrap();
                    if let Some(step) = state.execution_history.get_mut(step_index) {
                        step.status = StepStatus::Failed;
                        step.error = Some(message.clone());
                    }
                    state.current_step = None;
                }
                self.graph.lock().unwrap().mark_tool_failed(&node_id, &message);
                self.events.publish(
                    AgentEventType::ToolFailed,
                    json!({"tool": tool_name, "nodeId": node_id, "error": message}),
                );
            }
        }
    }

    fn flag_tool(&self, tool_name: &str, node_id: &str, reason: &str, missing_params: &[String]) {
        {
            let mut state = self.state.lock().unwrap();
            state.flagged_tools.push(FlaggedTool {
                tool: tool_name.to_string(),
                reason: reason.to_string(),
            });
            state.current_step = None;
        }
        self.graph
            .lock()
            .unwrap()
            .mark_tool_skipped(node_id, reason, missing_params);
        self.events.publish(
            AgentEventType::ToolSkipped,
            json!({
                "tool": tool_name,
                "nodeId": node_id,
                "reason": reason,
                "missingParams": missing_params,
            }),
        );
    }

    fn emit_status(&self, status: AgentStatus) {
        self.events.publish(
            AgentEventType::StatusChange,
            json!({"status": status.as_str()}),
        );
    }
}

impl Default for AgentOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}
