use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ColorTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Uuid,
    Numeric,
    Path,
    Slug,
    Unknown,
}

impl ResourceType {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::Uuid => "uuid",
            ResourceType::Numeric => "numeric",
            ResourceType::Path => "path",
            ResourceType::Slug => "slug",
            ResourceType::Unknown => "unknown",
        }
    }
}

/// An identifier mined from a tool response and persisted by the indexer.
///
/// At most one entry exists per `(id, discovered_from_user)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedResource {
    pub entry_id: Uuid,
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub field_name: String,
    pub field_path: String,
    pub parent_context: Value,
    pub discovered_by_tool: String,
    pub discovered_from_user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_color: Option<ColorTag>,
    pub timestamp: i64,
}
