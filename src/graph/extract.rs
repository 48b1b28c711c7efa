use serde_json::Value;

use crate::types::unwrap_envelope;

const MAX_ARRAY_ITEMS: usize = 10;
const MAX_VALUE_LENGTH: usize = 100;

const EXACT_ID_FIELDS: &[&str] = &["uuid", "slug", "name", "code", "handle", "identifier"];

/// Looser field predicate than the indexer's: the graph wants coverage
/// for visualization, not a clean persistent index.
pub fn is_graph_id_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with("id")
        || (lower.ends_with("key") && !lower.contains("api") && !lower.contains("secret"))
        || EXACT_ID_FIELDS.contains(&lower.as_str())
}

pub fn is_id_like_value(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_VALUE_LENGTH
        && !value.contains("  ")
        && value.split(' ').count() <= 3
        && !value.starts_with("http://")
        && !value.starts_with("https://")
}

#[derive(Debug, Clone)]
pub struct DiscoveredResource {
    pub field_name: String,
    pub value: String,
}

/// Collects identifier-looking strings out of a tool result, visiting at
/// most the first ten elements of any array.
pub fn extract_resources(result: &Value) -> Vec<DiscoveredResource> {
    let unwrapped = unwrap_envelope(result);
    let mut out = Vec::new();
    collect(&unwrapped, &mut out);
    out
}

fn collect(value: &Value, out: &mut Vec<DiscoveredResource>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match child {
                    Value::String(s) => {
                        if is_graph_id_field(key) && is_id_like_value(s) {
                            out.push(DiscoveredResource {
                                field_name: key.clone(),
                                value: s.clone(),
                            });
                        }
                    }
                    Value::Object(_) | Value::Array(_) => collect(child, out),
                    _ => {}
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter().take(MAX_ARRAY_ITEMS) {
                collect(item, out);
            }
        }
        _ => {}
    }
}
