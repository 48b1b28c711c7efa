use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::types::{DependencyAnalysis, NextToolDecision, ParameterExtraction, ToolInfo};

use super::llm::LlmProvider;
use super::prompts;

/// The three agent-facing LLM operations, shared across provider
/// variants. Model replies are JSON, possibly wrapped in markdown fences;
/// every operation degrades to a deterministic fallback instead of
/// propagating transport or parse errors.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
}

impl LlmClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn analyze_tool_dependencies(&self, tools: &[ToolInfo]) -> Vec<DependencyAnalysis> {
        let prompt = prompts::analyze_dependencies(tools);
        match self.provider.complete(&prompt).await {
            Ok(reply) => {
                match serde_json::from_str::<Vec<DependencyAnalysis>>(strip_code_fences(&reply)) {
                    Ok(analysis) => return analysis,
                    Err(e) => warn!(error = %e, "unparseable dependency analysis, using fallback"),
                }
            }
            Err(e) => warn!(error = %e, "dependency analysis call failed, using fallback"),
        }
        fallback_analysis(tools)
    }

    pub async fn extract_parameters(
        &self,
        tool: &ToolInfo,
        context: &Map<String, Value>,
    ) -> ParameterExtraction {
        let prompt = prompts::extract_parameters(tool, context);
        match self.provider.complete(&prompt).await {
            Ok(reply) => {
                match serde_json::from_str::<ParameterExtraction>(strip_code_fences(&reply)) {
                    Ok(extraction) => return extraction,
                    Err(e) => {
                        warn!(tool = %tool.name, error = %e, "unparseable extraction, using fallback")
                    }
                }
            }
            Err(e) => warn!(tool = %tool.name, error = %e, "extraction call failed, using fallback"),
        }
        ParameterExtraction {
            params: Map::new(),
            sources: Default::default(),
            confidence: 0.0,
            missing_params: tool.input_schema.required.clone(),
        }
    }

    pub async fn select_next_tool(
        &self,
        tools: &[ToolInfo],
        executed: &[String],
        context: &Map<String, Value>,
        current_depth: u32,
        max_depth: u32,
    ) -> NextToolDecision {
        if current_depth >= max_depth {
            return NextToolDecision {
                tool: None,
                reason: "Maximum depth reached".to_string(),
            };
        }
        let unexecuted: Vec<&ToolInfo> = tools
            .iter()
            .filter(|t| !executed.contains(&t.name))
            .collect();
        if unexecuted.is_empty() {
            return NextToolDecision {
                tool: None,
                reason: "All tools have been executed".to_string(),
            };
        }

        let prompt = prompts::select_next_tool(tools, executed, context, current_depth, max_depth);
        match self.provider.complete(&prompt).await {
            Ok(reply) => {
                if let Some(decision) = parse_decision(strip_code_fences(&reply)) {
                    return decision;
                }
                warn!("unparseable tool selection, using fallback");
            }
            Err(e) => warn!(error = %e, "tool selection call failed, using fallback"),
        }
        fallback_selection(&unexecuted, context)
    }
}

/// Drops a leading ```/```json fence and a trailing ``` fence, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let without_close = without_open.strip_suffix("```").unwrap_or(without_open);
    without_close.trim()
}

/// Some models wrap the decision in a one-element array; accept the first
/// element when it names a tool.
fn parse_decision(reply: &str) -> Option<NextToolDecision> {
    let value: Value = serde_json::from_str(reply).ok()?;
    let value = match value {
        Value::Array(items) => {
            let first = items.into_iter().next()?;
            if first.get("tool").map_or(true, Value::is_null) {
                return None;
            }
            first
        }
        other => other,
    };
    serde_json::from_value(value).ok()
}

fn fallback_analysis(tools: &[ToolInfo]) -> Vec<DependencyAnalysis> {
    tools
        .iter()
        .enumerate()
        .map(|(i, tool)| DependencyAnalysis {
            tool: tool.name.clone(),
            required_params: tool.input_schema.required.clone(),
            can_execute_without_context: tool.input_schema.required.is_empty(),
            suggested_order: (i + 1) as u32,
            dependencies: Vec::new(),
        })
        .collect()
}

/// Deterministic selection when the model is unavailable: prefer tools
/// without required parameters, then tools whose required names all show
/// up somewhere in the context values.
fn fallback_selection(unexecuted: &[&ToolInfo], context: &Map<String, Value>) -> NextToolDecision {
    if let Some(tool) = unexecuted.iter().find(|t| t.input_schema.required.is_empty()) {
        return NextToolDecision {
            tool: Some(tool.name.clone()),
            reason: format!("Fallback selection: {} requires no parameters", tool.name),
        };
    }

    let haystacks: Vec<String> = context.values().map(|v| v.to_string()).collect();
    if let Some(tool) = unexecuted.iter().find(|t| {
        t.input_schema
            .required
            .iter()
            .all(|param| haystacks.iter().any(|h| h.contains(param.as_str())))
    }) {
        return NextToolDecision {
            tool: Some(tool.name.clone()),
            reason: format!(
                "Fallback selection: required parameters for {} appear in the available context",
                tool.name
            ),
        };
    }

    NextToolDecision {
        tool: None,
        reason: "No suitable tool could be selected from the remaining set".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::MockProvider;

    fn client_with(responses: Vec<&str>) -> LlmClient {
        LlmClient::new(Arc::new(MockProvider::with_responses(responses)))
    }

    fn no_param_tool(name: &str) -> ToolInfo {
        ToolInfo::new(name)
    }

    fn tool_requiring(name: &str, param: &str) -> ToolInfo {
        ToolInfo::new(name).with_required_param(param, "string")
    }

    #[test]
    fn test_strip_code_fences_variants() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1,2]\n```"), "[1,2]");
        assert_eq!(strip_code_fences("  ```json\n{}\n```  "), "{}");
    }

    #[tokio::test]
    async fn test_analysis_fallback_on_transport_error() {
        let client = client_with(vec![]);
        let tools = vec![no_param_tool("list"), tool_requiring("get", "id")];

        let analysis = client.analyze_tool_dependencies(&tools).await;
        assert_eq!(analysis.len(), 2);
        assert!(analysis[0].can_execute_without_context);
        assert_eq!(analysis[0].suggested_order, 1);
        assert!(!analysis[1].can_execute_without_context);
        assert_eq!(analysis[1].required_params, vec!["id"]);
        assert_eq!(analysis[1].suggested_order, 2);
    }

    #[tokio::test]
    async fn test_extraction_fallback_reports_required_missing() {
        let client = client_with(vec!["not json at all"]);
        let tool = tool_requiring("get", "id");

        let extraction = client.extract_parameters(&tool, &Map::new()).await;
        assert!(extraction.params.is_empty());
        assert_eq!(extraction.confidence, 0.0);
        assert_eq!(extraction.missing_params, vec!["id"]);
    }

    #[tokio::test]
    async fn test_selection_short_circuits_on_depth() {
        let client = client_with(vec![]);
        let tools = vec![no_param_tool("list")];

        let decision = client
            .select_next_tool(&tools, &[], &Map::new(), 10, 10)
            .await;
        assert!(decision.tool.is_none());
        assert_eq!(decision.reason, "Maximum depth reached");
    }

    #[tokio::test]
    async fn test_selection_short_circuits_when_all_executed() {
        let client = client_with(vec![]);
        let tools = vec![no_param_tool("list")];

        let decision = client
            .select_next_tool(&tools, &["list".to_string()], &Map::new(), 0, 10)
            .await;
        assert!(decision.tool.is_none());
        assert_eq!(decision.reason, "All tools have been executed");
    }

    #[tokio::test]
    async fn test_selection_unwraps_array_reply() {
        let client = client_with(vec![r#"[{"tool": "list", "reason": "start"}]"#]);
        let tools = vec![no_param_tool("list")];

        let decision = client
            .select_next_tool(&tools, &[], &Map::new(), 0, 10)
            .await;
        assert_eq!(decision.tool.as_deref(), Some("list"));
    }

    #[tokio::test]
    async fn test_selection_fallback_prefers_no_param_tool() {
        let client = client_with(vec!["garbage"]);
        let tools = vec![tool_requiring("get", "id"), no_param_tool("list")];

        let decision = client
            .select_next_tool(&tools, &[], &Map::new(), 0, 10)
            .await;
        assert_eq!(decision.tool.as_deref(), Some("list"));
    }

    #[tokio::test]
    async fn test_selection_fallback_uses_context_substrings() {
        let client = client_with(vec!["garbage"]);
        let tools = vec![tool_requiring("get", "issueId")];
        let mut context = Map::new();
        context.insert(
            "search".to_string(),
            serde_json::json!({"issueId": "PROJ-1"}),
        );

        let decision = client
            .select_next_tool(&tools, &[], &context, 0, 10)
            .await;
        assert_eq!(decision.tool.as_deref(), Some("get"));
    }

    #[tokio::test]
    async fn test_selection_fallback_gives_up_cleanly() {
        let client = client_with(vec!["garbage"]);
        let tools = vec![tool_requiring("get", "absentParam")];

        let decision = client
            .select_next_tool(&tools, &[], &Map::new(), 0, 10)
            .await;
        assert!(decision.tool.is_none());
        assert!(!decision.reason.is_empty());
    }
}
