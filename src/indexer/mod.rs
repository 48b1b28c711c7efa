pub mod detect;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::{data_dir, read_json_or_default, write_json_atomic};
use crate::types::{unwrap_envelope, IndexedResource, UserProfile};

pub const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ResourceFile {
    #[serde(default)]
    resources: Vec<IndexedResource>,
}

#[derive(Default)]
struct IndexState {
    resources: Vec<IndexedResource>,
    seen: HashSet<String>,
}

/// Process-wide identifier index. Mines IDs out of tool responses,
/// deduplicates per `(id, user)`, and persists the full list to
/// `resources.json` on every insertion.
pub struct ResourceIndexer {
    path: PathBuf,
    state: Mutex<IndexState>,
}

impl ResourceIndexer {
    pub fn open_default() -> Self {
        Self::open(data_dir().join("resources.json"))
    }

    pub fn open(path: PathBuf) -> Self {
        let file: ResourceFile = read_json_or_default(&path);
        let seen = file
            .resources
            .iter()
            .map(|r| dedup_key(&r.id, &r.discovered_from_user))
            .collect();
        Self {
            path,
            state: Mutex::new(IndexState {
                resources: file.resources,
                seen,
            }),
        }
    }

    /// Extracts identifiers from `response`, filters ones already known for
    /// this user, persists, and returns only the newly-added entries.
    pub fn index_response(
        &self,
        user: Option<&UserProfile>,
        tool_name: &str,
        response: &Value,
    ) -> Vec<IndexedResource> {
        let payload = unwrap_envelope(response);
        let candidates = detect::extract_candidates(&payload);
        if candidates.is_empty() {
            return Vec::new();
        }

        let user_key = user
            .map(|u| u.id.to_string())
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());

        let mut state = self.state.lock().unwrap();
        let mut added = Vec::new();
        for candidate in candidates {
            if !state.seen.insert(dedup_key(&candidate.id, &user_key)) {
                continue;
            }
            let entry = IndexedResource {
                entry_id: Uuid::new_v4(),
                id: candidate.id,
                resource_type: candidate.resource_type,
                field_name: candidate.field_name,
                field_path: candidate.field_path,
                parent_context: candidate.parent_context,
                discovered_by_tool: tool_name.to_string(),
                discovered_from_user: user_key.clone(),
                user_display_name: user.map(|u| u.display_name.clone()),
                user_color: user.map(|u| u.color_tag),
                timestamp: Utc::now().timestamp_millis(),
            };
            state.resources.push(entry.clone());
            added.push(entry);
        }

        if !added.is_empty() {
            debug!(tool = tool_name, count = added.len(), "indexed new resources");
            if let Err(e) = self.persist(&state.resources) {
                warn!(path = %self.path.display(), error = %e, "failed to persist resource index");
            }
        }
        added
    }

    pub fn resources(&self) -> Vec<IndexedResource> {
        self.state.lock().unwrap().resources.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.resources.clear();
        state.seen.clear();
        self.persist(&state.resources)
    }

    fn persist(&self, resources: &[IndexedResource]) -> Result<()> {
        write_json_atomic(
            &self.path,
            &ResourceFile {
                resources: resources.to_vec(),
            },
        )
    }
}

fn dedup_key(id: &str, user: &str) -> String {
    format!("{id}::{user}")
}
