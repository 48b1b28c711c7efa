use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::types::ResourceType;

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$",
    )
    .unwrap()
});
static ARI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ari:cloud:[a-z]+::[a-z0-9-]+/[a-z0-9-]+$").unwrap());
static ISSUE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]+-[0-9]+$").unwrap());
static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{3,}$").unwrap());
static PATH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/[\w\-/]+$").unwrap());
static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9]+[-_][a-z0-9]+[-_a-z0-9]*$").unwrap());

const MAX_ID_LENGTH: usize = 500;
const MAX_CONTEXT_STRING: usize = 200;

/// Field names that mark their value as a candidate identifier. A field
/// matches when its lowercased name equals or ends with one of these.
const ID_FIELD_NAMES: &[&str] = &[
    "id",
    "uuid",
    "key",
    "resourceid",
    "objectid",
    "entityid",
    "userid",
    "accountid",
    "projectid",
    "issueid",
    "pageid",
    "spaceid",
    "ari",
    "cloudid",
    "siteid",
    "workspaceid",
    "boardid",
    "ticketid",
    "documentid",
    "fileid",
    "folderid",
    "groupid",
    "teamid",
    "channelid",
    "conversationid",
    "messageid",
    "attachmentid",
    "commentid",
    "self",
];

pub fn is_id_like_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    ID_FIELD_NAMES
        .iter()
        .any(|candidate| lower == *candidate || lower.ends_with(candidate))
}

/// Ordered type detection; the first matching pattern wins.
pub fn detect_type(value: &str) -> Option<ResourceType> {
    if value.is_empty() || value.len() > MAX_ID_LENGTH {
        return None;
    }
    if UUID_RE.is_match(value) {
        return Some(ResourceType::Uuid);
    }
    if ARI_RE.is_match(value) {
        return Some(ResourceType::Path);
    }
    if ISSUE_KEY_RE.is_match(value) {
        return Some(ResourceType::Slug);
    }
    if NUMERIC_RE.is_match(value) {
        return Some(ResourceType::Numeric);
    }
    if PATH_RE.is_match(value) {
        return Some(ResourceType::Path);
    }
    if SLUG_RE.is_match(value) {
        return Some(ResourceType::Slug);
    }
    None
}

/// Patterns strong enough to index regardless of the enclosing field name.
pub fn matches_strong_pattern(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_ID_LENGTH
        && (UUID_RE.is_match(value) || ISSUE_KEY_RE.is_match(value))
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub resource_type: ResourceType,
    pub field_name: String,
    pub field_path: String,
    pub parent_context: Value,
}

/// Depth-first walk over an already-unwrapped tool response, producing
/// every candidate identifier in document order.
pub fn extract_candidates(value: &Value) -> Vec<Candidate> {
    let mut out = Vec::new();
    walk(value, String::new(), None, &mut out);
    out
}

fn walk(
    value: &Value,
    path: String,
    parent: Option<&Map<String, Value>>,
    out: &mut Vec<Candidate>,
) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                match child {
                    Value::String(s) => maybe_emit_string(s, key, &child_path, Some(map), out),
                    Value::Number(n) => {
                        maybe_emit_number(n, key, &child_path, Some(map), out)
                    }
                    Value::Object(_) | Value::Array(_) => {
                        walk(child, child_path, Some(map), out)
                    }
                    _ => {}
                }
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{i}]");
                match item {
                    Value::String(s) => {
                        let field = field_name_from_path(&item_path);
                        maybe_emit_string(s, &field, &item_path, parent, out);
                    }
                    Value::Number(n) => {
                        let field = field_name_from_path(&item_path);
                        maybe_emit_number(n, &field, &item_path, parent, out);
                    }
                    Value::Object(map) => walk(item, item_path, Some(map), out),
                    Value::Array(_) => walk(item, item_path, parent, out),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn maybe_emit_string(
    value: &str,
    field_name: &str,
    path: &str,
    parent: Option<&Map<String, Value>>,
    out: &mut Vec<Candidate>,
) {
    let resource_type = if is_id_like_field(field_name) {
        match detect_type(value) {
            Some(t) => t,
            None => return,
        }
    } else if matches_strong_pattern(value) {
        detect_type(value).unwrap_or(ResourceType::Unknown)
    } else {
        return;
    };

    out.push(Candidate {
        id: value.to_string(),
        resource_type,
        field_name: field_name.to_string(),
        field_path: path.to_string(),
        parent_context: parent_context(parent, field_name),
    });
}

fn maybe_emit_number(
    value: &serde_json::Number,
    field_name: &str,
    path: &str,
    parent: Option<&Map<String, Value>>,
    out: &mut Vec<Candidate>,
) {
    if !is_id_like_field(field_name) {
        return;
    }
    if value.as_f64().map_or(true, |n| n <= 100.0) {
        return;
    }

    out.push(Candidate {
        id: value.to_string(),
        resource_type: ResourceType::Numeric,
        field_name: field_name.to_string(),
        field_path: path.to_string(),
        parent_context: parent_context(parent, field_name),
    });
}

/// Snapshot of the primitive siblings around an identifier, with long
/// strings truncated so the index stays readable.
fn parent_context(parent: Option<&Map<String, Value>>, exclude: &str) -> Value {
    let mut context = Map::new();
    if let Some(map) = parent {
        for (key, value) in map {
            if key == exclude {
                continue;
            }
            match value {
                Value::String(s) => {
                    let trimmed = if s.chars().count() > MAX_CONTEXT_STRING {
                        let head: String = s.chars().take(MAX_CONTEXT_STRING).collect();
                        format!("{head}...")
                    } else {
                        s.clone()
                    };
                    context.insert(key.clone(), Value::String(trimmed));
                }
                Value::Number(_) | Value::Bool(_) => {
                    context.insert(key.clone(), value.clone());
                }
                _ => {}
            }
        }
    }
    Value::Object(context)
}

fn field_name_from_path(path: &str) -> String {
    let segment = path.rsplit('.').next().unwrap_or(path);
    match segment.find('[') {
        Some(i) => segment[..i].to_string(),
        None => segment.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_like_field_matching() {
        assert!(is_id_like_field("id"));
        assert!(is_id_like_field("projectId"));
        assert!(is_id_like_field("PROJECT_ID"));
        assert!(is_id_like_field("parentId"));
        assert!(is_id_like_field("self"));
        assert!(!is_id_like_field("title"));
        assert!(!is_id_like_field("description"));
    }

    #[test]
    fn test_detection_order() {
        assert_eq!(
            detect_type("550e8400-e29b-41d4-a716-446655440000"),
            Some(ResourceType::Uuid)
        );
        assert_eq!(
            detect_type("ari:cloud:jira::site/abc-123"),
            Some(ResourceType::Path)
        );
        assert_eq!(detect_type("PROJ-42"), Some(ResourceType::Slug));
        assert_eq!(detect_type("12345"), Some(ResourceType::Numeric));
        assert_eq!(detect_type("/spaces/dev/pages"), Some(ResourceType::Path));
        assert_eq!(detect_type("my-page-slug"), Some(ResourceType::Slug));
        assert_eq!(detect_type("plain words here"), None);
    }

    #[test]
    fn test_length_bounds_reject() {
        assert_eq!(detect_type(""), None);
        let long = "a-".repeat(251);
        assert_eq!(long.len(), 502);
        assert_eq!(detect_type(&long[..501]), None);
    }

    #[test]
    fn test_numeric_threshold() {
        let candidates = extract_candidates(&json!({"userId": 100}));
        assert!(candidates.is_empty());

        let candidates = extract_candidates(&json!({"userId": 101}));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "101");
        assert_eq!(candidates[0].resource_type, ResourceType::Numeric);
    }

    #[test]
    fn test_strong_pattern_without_id_field() {
        let candidates =
            extract_candidates(&json!({"note": "550e8400-e29b-41d4-a716-446655440000"}));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].resource_type, ResourceType::Uuid);

        // A plain slug under a non-ID-like field stays unindexed.
        let candidates = extract_candidates(&json!({"note": "some-random-slug"}));
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_field_path_through_arrays() {
        let candidates = extract_candidates(&json!({
            "results": [{"id": "PROJ-7", "title": "hello"}]
        }));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].field_path, "results[0].id");
        assert_eq!(candidates[0].field_name, "id");
        assert_eq!(candidates[0].parent_context, json!({"title": "hello"}));
    }

    #[test]
    fn test_parent_context_truncates_long_strings() {
        let long = "x".repeat(300);
        let candidates = extract_candidates(&json!({"id": "PROJ-1", "body": long}));
        assert_eq!(candidates.len(), 1);
        let body = candidates[0].parent_context["body"].as_str().unwrap();
        assert_eq!(body.len(), 203);
        assert!(body.ends_with("..."));
    }

    #[test]
    fn test_bare_string_array_uses_enclosing_field() {
        let candidates = extract_candidates(&json!({
            "issueIds": ["PROJ-1", "PROJ-2"]
        }));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].field_name, "issueIds");
        assert_eq!(candidates[0].field_path, "issueIds[0]");
        assert_eq!(candidates[1].field_path, "issueIds[1]");
    }
}
