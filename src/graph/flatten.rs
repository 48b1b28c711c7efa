use serde_json::{json, Map, Value};

use crate::types::unwrap_envelope;

const REDACTED: &str = "[REDACTED - long content]";
const MAX_WORDS: usize = 100;
const MAX_ARRAY_ITEMS: usize = 10;

/// Flattens a tool result into a lookup table. Every leaf is recorded
/// under both its bare key and its full dotted path; arrays contribute
/// their first element plus the whole array under `<prefix>_array`.
pub fn flatten(result: &Value) -> Map<String, Value> {
    let unwrapped = unwrap_envelope(result);
    let mut out = Map::new();
    flatten_into(&unwrapped, "", &mut out);
    out
}

fn flatten_into(value: &Value, prefix: &str, out: &mut Map<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match child {
                    Value::Object(_) | Value::Array(_) => flatten_into(child, &path, out),
                    leaf => {
                        out.insert(key.clone(), leaf.clone());
                        out.insert(path, leaf.clone());
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(first) = items.first() {
                flatten_into(first, prefix, out);
            }
            out.insert(format!("{prefix}_array"), value.clone());
        }
        leaf => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), leaf.clone());
            }
        }
    }
}

/// Trims a flattened result down to something a prompt can carry: long
/// prose is redacted, arrays are capped at ten elements.
pub fn sanitize_for_llm(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            if s.split_whitespace().count() > MAX_WORDS {
                json!(REDACTED)
            } else {
                value.clone()
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .take(MAX_ARRAY_ITEMS)
                .map(sanitize_for_llm)
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize_for_llm(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_records_bare_key_and_path() {
        let flat = flatten(&json!({"issue": {"id": "PROJ-1", "fields": {"summary": "hi"}}}));

        assert_eq!(flat["id"], "PROJ-1");
        assert_eq!(flat["issue.id"], "PROJ-1");
        assert_eq!(flat["summary"], "hi");
        assert_eq!(flat["issue.fields.summary"], "hi");
    }

    #[test]
    fn test_flatten_array_first_element_and_whole() {
        let flat = flatten(&json!({"results": [{"id": 1}, {"id": 2}]}));

        assert_eq!(flat["id"], 1);
        assert_eq!(flat["results.id"], 1);
        assert_eq!(flat["results_array"], json!([{"id": 1}, {"id": 2}]));
    }

    #[test]
    fn test_flatten_unwraps_envelope() {
        let flat = flatten(&json!({
            "content": [{"type": "text", "text": "{\"page\": {\"id\": \"p-1\"}}"}]
        }));
        assert_eq!(flat["page.id"], "p-1");
    }

    #[test]
    fn test_sanitize_redacts_long_prose() {
        let long = "word ".repeat(101);
        let sanitized = sanitize_for_llm(&json!({"body": long, "id": "x"}));
        assert_eq!(sanitized["body"], REDACTED);
        assert_eq!(sanitized["id"], "x");
    }

    #[test]
    fn test_sanitize_caps_arrays() {
        let sanitized = sanitize_for_llm(&json!((0..25).collect::<Vec<i32>>()));
        assert_eq!(sanitized.as_array().unwrap().len(), 10);
    }

    #[test]
    fn test_hundred_words_exactly_survive() {
        let text = "w ".repeat(100).trim_end().to_string();
        let sanitized = sanitize_for_llm(&json!(text));
        assert_eq!(sanitized, json!(text));
    }
}
