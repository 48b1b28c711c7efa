pub mod extract;
pub mod flatten;

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::types::{GraphEdge, GraphNode, GraphSnapshot, NodeStatus, NodeType};

/// In-memory provenance graph for one agent run. Tool invocations and
/// discovered identifiers are nodes; edges record which tool provided
/// which parameter and which tool surfaced which resource.
///
/// Operations on unknown node ids are silently ignored so callers can
/// stay oblivious to races between the loop and late bookkeeping.
#[derive(Default)]
pub struct ResourceGraph {
    nodes: HashMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    tool_results: HashMap<String, Value>,
    edge_counter: u64,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool invocation about to be scheduled. Node ids are
    /// `<name>_<epoch-ms>`; the millisecond is bumped on collision so ids
    /// and timestamps stay unique together.
    pub fn add_pending_tool(&mut self, tool_name: &str) -> String {
        let mut timestamp = Utc::now().timestamp_millis();
        let mut id = format!("{tool_name}_{timestamp}");
        while self.nodes.contains_key(&id) {
            timestamp += 1;
            id = format!("{tool_name}_{timestamp}");
        }
        self.nodes.insert(
            id.clone(),
            GraphNode {
                id: id.clone(),
                node_type: NodeType::Tool,
                name: tool_name.to_string(),
                data: json!({}),
                timestamp,
                status: NodeStatus::Pending,
            },
        );
        id
    }

    pub fn mark_tool_running(&mut self, node_id: &str, parameters: &Value) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            if node.status.is_terminal() {
                return;
            }
            node.status = NodeStatus::Running;
            set_data_field(node, "parameters", parameters.clone());
        }
    }

    /// Completes a tool node: stores the result, publishes the flattened
    /// result under the tool's name (most recent call wins), adds one
    /// `provided_<param>` edge per resolvable source, then mines the
    /// result for resource nodes.
    pub fn record_tool_execution(
        &mut self,
        node_id: &str,
        result: &Value,
        param_sources: &HashMap<String, String>,
    ) {
        let Some(node) = self.nodes.get_mut(node_id) else {
            return;
        };
        if node.status.is_terminal() {
            return;
        }
        node.status = NodeStatus::Completed;
        set_data_field(node, "result", result.clone());
        let tool_name = node.name.clone();

        self.tool_results
            .insert(tool_name, Value::Object(flatten::flatten(result)));

        for (param, source_node) in param_sources {
            self.add_edge(source_node, node_id, &format!("provided_{param}"), param);
        }

        for resource in extract::extract_resources(result) {
            let resource_id = format!("resource_{}_{}", resource.field_name, resource.value);
            if self.nodes.contains_key(&resource_id) {
                continue;
            }
            self.nodes.insert(
                resource_id.clone(),
                GraphNode {
                    id: resource_id.clone(),
                    node_type: NodeType::Resource,
                    name: resource.value.clone(),
                    data: json!({
                        "fieldName": resource.field_name,
                        "value": resource.value,
                    }),
                    timestamp: Utc::now().timestamp_millis(),
                    status: NodeStatus::Completed,
                },
            );
            self.add_edge(node_id, &resource_id, "discovered", &resource.field_name);
        }
    }

    pub fn mark_tool_failed(&mut self, node_id: &str, error: &str) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            if node.status.is_terminal() {
                return;
            }
            node.status = NodeStatus::Failed;
            set_data_field(node, "error", json!(error));
        }
    }

    pub fn mark_tool_skipped(&mut self, node_id: &str, reason: &str, missing_params: &[String]) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            if node.status.is_terminal() {
                return;
            }
            node.status = NodeStatus::Skipped;
            set_data_field(node, "reason", json!(reason));
            set_data_field(node, "missingParams", json!(missing_params));
        }
    }

    /// Tool name to sanitized flattened result, the context handed to the
    /// LLM for selection and parameter extraction.
    pub fn available_context(&self) -> Map<String, Value> {
        self.tool_results
            .iter()
            .map(|(name, flat)| (name.clone(), flatten::sanitize_for_llm(flat)))
            .collect()
    }

    pub fn tool_result(&self, tool_name: &str) -> Option<&Value> {
        self.tool_results.get(tool_name)
    }

    /// The most recent tool node carrying this name, if any.
    pub fn node_id_for_tool(&self, tool_name: &str) -> Option<String> {
        self.nodes
            .values()
            .filter(|n| n.node_type == NodeType::Tool && n.name == tool_name)
            .max_by_key(|n| n.timestamp)
            .map(|n| n.id.clone())
    }

    pub fn node(&self, node_id: &str) -> Option<&GraphNode> {
        self.nodes.get(node_id)
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<GraphNode> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        GraphSnapshot {
            nodes,
            edges: self.edges.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.tool_results.clear();
        self.edge_counter = 0;
    }

    fn add_edge(&mut self, source: &str, target: &str, relation: &str, param_name: &str) {
        if !self.nodes.contains_key(source) || !self.nodes.contains_key(target) {
            return;
        }
        self.edge_counter += 1;
        self.edges.push(GraphEdge {
            id: format!("edge_{}", self.edge_counter),
            source: source.to_string(),
            target: target.to_string(),
            relation: relation.to_string(),
            param_name: param_name.to_string(),
        });
    }
}

fn set_data_field(node: &mut GraphNode, key: &str, value: Value) {
    if !node.data.is_object() {
        node.data = json!({});
    }
    if let Some(map) = node.data.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}
