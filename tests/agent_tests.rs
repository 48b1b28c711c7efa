//! Integration tests for the agent orchestrator: depth bounding,
//! confidence flagging, cancellation, and event ordering, driven by a
//! scripted LLM and an in-process tool server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use mcpscope::engine::{AgentConfig, AgentOrchestrator, ToolClient};
use mcpscope::providers::{LlmClient, LlmProvider, MockProvider};
use mcpscope::types::{
    AgentEvent, AgentEventType, AgentStatus, NodeStatus, StepStatus, ToolInfo,
};

/// Tool server fake: fixed catalog, canned results, call log, and an
/// optional per-call delay so tests can catch the loop mid-flight.
struct ScriptedTools {
    tools: Vec<ToolInfo>,
    results: HashMap<String, Value>,
    failures: Vec<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTools {
    fn new(tools: Vec<ToolInfo>) -> Self {
        Self {
            tools,
            results: HashMap::new(),
            failures: Vec::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_result(mut self, tool: &str, result: Value) -> Self {
        self.results.insert(tool.to_string(), result);
        self
    }

    fn with_failure(mut self, tool: &str) -> Self {
        self.failures.push(tool.to_string());
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolClient for ScriptedTools {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> Result<Value> {
        self.calls.lock().unwrap().push(name.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failures.iter().any(|f| f == name) {
            anyhow::bail!("tool {name} blew up");
        }
        Ok(self.results.get(name).cloned().unwrap_or_else(|| json!({})))
    }
}

/// Plays scripted replies, then hangs forever instead of erroring out.
struct HangWhenExhausted {
    inner: MockProvider,
}

#[async_trait]
impl LlmProvider for HangWhenExhausted {
    fn name(&self) -> &str {
        "hanging-mock"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.inner.complete(prompt).await {
            Ok(reply) => Ok(reply),
            Err(_) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

fn no_param_tool(name: &str) -> ToolInfo {
    ToolInfo::new(name)
}

fn tool_requiring(name: &str, param: &str) -> ToolInfo {
    ToolInfo::new(name).with_required_param(param, "string")
}

fn extraction(params: Value, sources: Value, confidence: f64, missing: Value) -> String {
    json!({
        "params": params,
        "sources": sources,
        "confidence": confidence,
        "missingParams": missing,
    })
    .to_string()
}

fn selection(tool: &str) -> String {
    json!({"tool": tool, "reason": "scripted"}).to_string()
}

async fn collect_until_finished(
    events: &mut broadcast::Receiver<AgentEvent>,
) -> Vec<AgentEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("agent did not finish in time")
            .expect("event bus closed early");
        let event_type = event.event_type;
        seen.push(event);
        if matches!(
            event_type,
            AgentEventType::AgentComplete | AgentEventType::Error
        ) {
            break;
        }
    }
    seen
}

#[tokio::test]
async fn test_depth_bound_flags_deep_chain() {
    let tools = Arc::new(
        ScriptedTools::new(vec![
            no_param_tool("A"),
            tool_requiring("B", "id"),
            tool_requiring("C", "id"),
        ])
        .with_result("A", json!({"id": "a-1"}))
        .with_result("B", json!({"id": "b-1"})),
    );
    let provider = MockProvider::with_responses(vec![
        "[]".to_string(),
        selection("A"),
        extraction(json!({}), json!({}), 1.0, json!([])),
        selection("B"),
        extraction(json!({"id": "a-1"}), json!({"id": "A.id"}), 0.9, json!([])),
        selection("C"),
        extraction(json!({"id": "b-1"}), json!({"id": "B.id"}), 0.9, json!([])),
    ]);

    let orchestrator = Arc::new(AgentOrchestrator::new());
    orchestrator.configure(
        AgentConfig::new(LlmClient::new(Arc::new(provider)), tools.clone()).with_max_depth(2),
    );

    let mut events = orchestrator.subscribe();
    orchestrator.start().unwrap();
    collect_until_finished(&mut events).await;

    let state = orchestrator.state();
    assert_eq!(state.status, AgentStatus::Completed);
    assert_eq!(tools.calls(), vec!["A", "B"]);

    let depths: HashMap<&str, u32> = state
        .execution_history
        .iter()
        .map(|s| (s.tool_name.as_str(), s.depth))
        .collect();
    assert_eq!(depths["A"], 1);
    assert_eq!(depths["B"], 2);
    assert_eq!(state.current_depth, 2);

    assert_eq!(state.flagged_tools.len(), 1);
    assert_eq!(state.flagged_tools[0].tool, "C");
    assert_eq!(state.flagged_tools[0].reason, "Exceeds max depth (3 > 2)");

    let skipped = state
        .graph
        .nodes
        .iter()
        .find(|n| n.name == "C")
        .expect("C has a graph node");
    assert_eq!(skipped.status, NodeStatus::Skipped);
}

#[tokio::test]
async fn test_low_confidence_flags_without_calling() {
    let tools = Arc::new(ScriptedTools::new(vec![tool_requiring("X", "x")]));
    let provider = MockProvider::with_responses(vec![
        "[]".to_string(),
        selection("X"),
        extraction(json!({}), json!({}), 0.2, json!(["x"])),
    ]);

    let orchestrator = Arc::new(AgentOrchestrator::new());
    orchestrator
        .configure(AgentConfig::new(LlmClient::new(Arc::new(provider)), tools.clone()));

    let mut events = orchestrator.subscribe();
    orchestrator.start().unwrap();
    let events = collect_until_finished(&mut events).await;

    let state = orchestrator.state();
    assert!(tools.calls().is_empty());
    assert_eq!(state.flagged_tools.len(), 1);
    assert_eq!(
        state.flagged_tools[0].reason,
        "Could not resolve required parameters from available context"
    );
    assert!(state.execution_history.is_empty());

    let skipped = events
        .iter()
        .find(|e| e.event_type == AgentEventType::ToolSkipped)
        .expect("tool_skipped emitted");
    assert_eq!(skipped.data["tool"], "X");
    assert_eq!(skipped.data["missingParams"], json!(["x"]));
}

#[tokio::test]
async fn test_mid_confidence_with_missing_params_still_runs() {
    let tools = Arc::new(ScriptedTools::new(vec![tool_requiring("X", "x")]));
    let provider = MockProvider::with_responses(vec![
        "[]".to_string(),
        selection("X"),
        extraction(json!({}), json!({}), 0.6, json!(["x"])),
    ]);

    let orchestrator = Arc::new(AgentOrchestrator::new());
    orchestrator
        .configure(AgentConfig::new(LlmClient::new(Arc::new(provider)), tools.clone()));

    let mut events = orchestrator.subscribe();
    orchestrator.start().unwrap();
    collect_until_finished(&mut events).await;

    assert_eq!(tools.calls(), vec!["X"]);
    assert!(orchestrator.state().flagged_tools.is_empty());
}

#[tokio::test]
async fn test_tool_failure_is_not_fatal() {
    let tools = Arc::new(
        ScriptedTools::new(vec![no_param_tool("bad"), no_param_tool("good")])
            .with_failure("bad")
            .with_result("good", json!({"ok": true})),
    );
    let provider = MockProvider::with_responses(vec![
        "[]".to_string(),
        selection("bad"),
        extraction(json!({}), json!({}), 1.0, json!([])),
        selection("good"),
        extraction(json!({}), json!({}), 1.0, json!([])),
    ]);

    let orchestrator = Arc::new(AgentOrchestrator::new());
    orchestrator
        .configure(AgentConfig::new(LlmClient::new(Arc::new(provider)), tools.clone()));

    let mut events = orchestrator.subscribe();
    orchestrator.start().unwrap();
    let events = collect_until_finished(&mut events).await;

    let state = orchestrator.state();
    assert_eq!(state.status, AgentStatus::Completed);
    assert_eq!(tools.calls(), vec!["bad", "good"]);

    let statuses: HashMap<&str, StepStatus> = state
        .execution_history
        .iter()
        .map(|s| (s.tool_name.as_str(), s.status))
        .collect();
    assert_eq!(statuses["bad"], StepStatus::Failed);
    assert_eq!(statuses["good"], StepStatus::Completed);

    assert!(events
        .iter()
        .any(|e| e.event_type == AgentEventType::ToolFailed));
    let failed_node = state.graph.nodes.iter().find(|n| n.name == "bad").unwrap();
    assert_eq!(failed_node.status, NodeStatus::Failed);
}

#[tokio::test]
async fn test_stop_discards_late_replies() {
    // A second tool keeps the unexecuted set non-empty, so the loop asks
    // the model again after A and lands on the hanging reply.
    let tools = Arc::new(
        ScriptedTools::new(vec![no_param_tool("A"), no_param_tool("B")])
            .with_result("A", json!({"id": "a-1"})),
    );
    let provider = HangWhenExhausted {
        inner: MockProvider::with_responses(vec![
            "[]".to_string(),
            selection("A"),
            extraction(json!({}), json!({}), 1.0, json!([])),
        ]),
    };

    let orchestrator = Arc::new(AgentOrchestrator::new());
    orchestrator
        .configure(AgentConfig::new(LlmClient::new(Arc::new(provider)), tools.clone()));

    let mut events = orchestrator.subscribe();
    orchestrator.start().unwrap();

    // Wait until A finished, then give the loop a beat to reach the
    // hanging selection call.
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        if event.event_type == AgentEventType::ToolComplete {
            break;
        }
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    orchestrator.stop();

    let state = orchestrator.state();
    assert_eq!(state.status, AgentStatus::Idle);
    assert!(state.end_time.is_some());
    assert_eq!(state.execution_history.len(), 1);
    assert_eq!(state.execution_history[0].status, StepStatus::Completed);

    // The stop transition itself is announced, then silence.
    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, AgentEventType::StatusChange);
    assert_eq!(event.data["status"], "idle");
    assert!(
        tokio::time::timeout(Duration::from_millis(200), events.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_pause_resume_mid_call_keeps_single_loop() {
    let tools = Arc::new(
        ScriptedTools::new(vec![no_param_tool("A"), no_param_tool("B")])
            .with_result("A", json!({"id": "a-1"}))
            .with_result("B", json!({"id": "b-1"}))
            .with_delay(Duration::from_millis(100)),
    );
    let provider = MockProvider::with_responses(vec![
        "[]".to_string(),
        selection("A"),
        extraction(json!({}), json!({}), 1.0, json!([])),
        selection("B"),
        extraction(json!({}), json!({}), 1.0, json!([])),
    ]);

    let orchestrator = Arc::new(AgentOrchestrator::new());
    orchestrator
        .configure(AgentConfig::new(LlmClient::new(Arc::new(provider)), tools.clone()));

    let mut events = orchestrator.subscribe();
    orchestrator.start().unwrap();

    // Catch the loop while A's call is still in flight, then pause and
    // immediately resume.
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        let event_type = event.event_type;
        seen.push(event);
        if event_type == AgentEventType::ToolStart {
            break;
        }
    }
    orchestrator.pause().unwrap();
    orchestrator.resume().unwrap();
    seen.extend(collect_until_finished(&mut events).await);

    // A single loop drove the run: A's in-flight call was recorded, B ran
    // once, and every milestone appears exactly once.
    assert_eq!(tools.calls(), vec!["A", "B"]);
    let count = |t: AgentEventType| seen.iter().filter(|e| e.event_type == t).count();
    assert_eq!(count(AgentEventType::ToolStart), 2);
    assert_eq!(count(AgentEventType::ToolComplete), 2);
    assert_eq!(count(AgentEventType::AgentComplete), 1);

    let state = orchestrator.state();
    assert_eq!(state.status, AgentStatus::Completed);
    assert_eq!(state.execution_history.len(), 2);
    assert!(state
        .execution_history
        .iter()
        .all(|s| s.status == StepStatus::Completed));
}

#[tokio::test]
async fn test_event_order_matches_execution() {
    let tools = Arc::new(
        ScriptedTools::new(vec![no_param_tool("A")]).with_result("A", json!({"ok": 1})),
    );
    let provider = MockProvider::with_responses(vec![
        "[]".to_string(),
        selection("A"),
        extraction(json!({}), json!({}), 1.0, json!([])),
    ]);

    let orchestrator = Arc::new(AgentOrchestrator::new());
    orchestrator.configure(AgentConfig::new(LlmClient::new(Arc::new(provider)), tools));

    let mut events = orchestrator.subscribe();
    orchestrator.start().unwrap();
    let events = collect_until_finished(&mut events).await;

    let order: Vec<AgentEventType> = events.iter().map(|e| e.event_type).collect();
    let position = |t: AgentEventType| order.iter().position(|&e| e == t).unwrap();

    assert!(position(AgentEventType::StatusChange) < position(AgentEventType::AnalysisComplete));
    assert!(position(AgentEventType::AnalysisComplete) < position(AgentEventType::ToolStart));
    assert!(position(AgentEventType::ToolStart) < position(AgentEventType::ToolComplete));
    assert!(position(AgentEventType::ToolComplete) < position(AgentEventType::AgentComplete));
}

#[tokio::test]
async fn test_completed_run_has_only_terminal_steps() {
    let tools = Arc::new(
        ScriptedTools::new(vec![no_param_tool("A"), no_param_tool("B")])
            .with_result("A", json!({"id": "a-1"}))
            .with_failure("B"),
    );
    let provider = MockProvider::with_responses(vec![
        "[]".to_string(),
        selection("A"),
        extraction(json!({}), json!({}), 1.0, json!([])),
        selection("B"),
        extraction(json!({}), json!({}), 1.0, json!([])),
    ]);

    let orchestrator = Arc::new(AgentOrchestrator::new());
    orchestrator.configure(AgentConfig::new(LlmClient::new(Arc::new(provider)), tools));

    let mut events = orchestrator.subscribe();
    orchestrator.start().unwrap();
    collect_until_finished(&mut events).await;

    let state = orchestrator.state();
    let max_depth = state.max_depth;
    for step in &state.execution_history {
        assert!(matches!(
            step.status,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        ));
        assert!(step.depth >= 1 && step.depth <= max_depth);
    }
    assert!(state.current_depth <= max_depth);
}
