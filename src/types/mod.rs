pub mod agent;
pub mod graph;
pub mod profile;
pub mod resource;
pub mod tool;

pub use agent::{
    AgentEvent, AgentEventType, AgentState, AgentStatus, DependencyAnalysis, ExecutionStep,
    FlaggedTool, NextToolDecision, ParameterDependency, ParameterExtraction, StepStatus,
    DEFAULT_MAX_DEPTH,
};
pub use graph::{GraphEdge, GraphNode, GraphSnapshot, NodeStatus, NodeType};
pub use profile::{ColorTag, UserProfile};
pub use resource::{IndexedResource, ResourceType};
pub use tool::{unwrap_envelope, PropertySchema, ToolInfo, ToolSchema};
