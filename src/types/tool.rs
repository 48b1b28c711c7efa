use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool exposed by the downstream server, as reported by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: ToolSchema,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(default)]
    pub properties: HashMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl ToolInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: ToolSchema::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_required_param(mut self, name: impl Into<String>, param_type: &str) -> Self {
        let name = name.into();
        self.input_schema.properties.insert(
            name.clone(),
            PropertySchema {
                param_type: param_type.to_string(),
                description: None,
                enum_values: None,
            },
        );
        self.input_schema.required.push(name);
        self
    }
}

/// Unwraps a tool-call envelope `{content:[{type:"text", text:...}]}`.
///
/// Each text item is attempted as JSON. Zero parsed items returns the
/// original response, exactly one returns the parsed value, and two or
/// more return the array of parsed values.
pub fn unwrap_envelope(response: &Value) -> Value {
    let Some(items) = response.get("content").and_then(Value::as_array) else {
        return response.clone();
    };

    let mut parsed: Vec<Value> = Vec::new();
    for item in items {
        if item.get("type").and_then(Value::as_str) != Some("text") {
            continue;
        }
        let Some(text) = item.get("text").and_then(Value::as_str) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            parsed.push(value);
        }
    }

    match parsed.len() {
        0 => response.clone(),
        1 => parsed.pop().unwrap(),
        _ => Value::Array(parsed),
    }
}
