use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    Blue,
    Red,
    Green,
    Purple,
    Orange,
    Yellow,
}

impl ColorTag {
    pub fn as_str(&self) -> &str {
        match self {
            ColorTag::Blue => "blue",
            ColorTag::Red => "red",
            ColorTag::Green => "green",
            ColorTag::Purple => "purple",
            ColorTag::Orange => "orange",
            ColorTag::Yellow => "yellow",
        }
    }
}

/// A named identity with a credential header set. The active profile is
/// used to attribute discovered identifiers and to decorate proxied calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub color_tag: ColorTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserProfile {
    pub fn new(display_name: impl Into<String>, color_tag: ColorTag) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            color_tag,
            authorization: None,
            headers: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
