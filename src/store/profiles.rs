use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::types::{ColorTag, UserProfile};

use super::{data_dir, read_json_or_default, write_json_atomic};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthFile {
    #[serde(default)]
    profiles: Vec<UserProfile>,
    #[serde(default)]
    active_profile_id: Option<Uuid>,
}

/// Process-wide store of user identities, persisted to `auth.json`.
///
/// Every mutation rewrites the file; persistence failures are logged and
/// the in-memory state stays authoritative for the rest of the process.
pub struct ProfileStore {
    path: PathBuf,
    inner: Mutex<AuthFile>,
}

impl ProfileStore {
    pub fn open_default() -> Self {
        Self::open(data_dir().join("auth.json"))
    }

    pub fn open(path: PathBuf) -> Self {
        let inner = read_json_or_default(&path);
        Self {
            path,
            inner: Mutex::new(inner),
        }
    }

    pub fn create_profile(
        &self,
        display_name: impl Into<String>,
        color_tag: ColorTag,
    ) -> UserProfile {
        let profile = UserProfile::new(display_name, color_tag);
        let mut inner = self.inner.lock().unwrap();
        inner.profiles.push(profile.clone());
        self.persist(&inner);
        profile
    }

    pub fn update_profile(&self, mut profile: UserProfile) -> Result<UserProfile> {
        let mut inner = self.inner.lock().unwrap();
        let Some(existing) = inner.profiles.iter_mut().find(|p| p.id == profile.id) else {
            bail!("profile {} not found", profile.id);
        };
        profile.created_at = existing.created_at;
        profile.updated_at = Utc::now().timestamp_millis();
        *existing = profile.clone();
        self.persist(&inner);
        Ok(profile)
    }

    pub fn delete_profile(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.profiles.len();
        inner.profiles.retain(|p| p.id != id);
        if inner.profiles.len() == before {
            bail!("profile {id} not found");
        }
        if inner.active_profile_id == Some(id) {
            inner.active_profile_id = None;
        }
        self.persist(&inner);
        Ok(())
    }

    pub fn profiles(&self) -> Vec<UserProfile> {
        self.inner.lock().unwrap().profiles.clone()
    }

    pub fn get(&self, id: Uuid) -> Option<UserProfile> {
        self.inner
            .lock()
            .unwrap()
            .profiles
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub fn set_active(&self, id: Option<Uuid>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(id) = id {
            if !inner.profiles.iter().any(|p| p.id == id) {
                bail!("profile {id} not found");
            }
        }
        inner.active_profile_id = id;
        self.persist(&inner);
        Ok(())
    }

    pub fn active_profile_id(&self) -> Option<Uuid> {
        self.inner.lock().unwrap().active_profile_id
    }

    pub fn active_profile(&self) -> Option<UserProfile> {
        let inner = self.inner.lock().unwrap();
        let id = inner.active_profile_id?;
        inner.profiles.iter().find(|p| p.id == id).cloned()
    }

    fn persist(&self, inner: &AuthFile) {
        if let Err(e) = write_json_atomic(&self.path, inner) {
            warn!(path = %self.path.display(), error = %e, "failed to persist profiles");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, ProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("auth.json"));
        (dir, store)
    }

    #[test]
    fn test_create_and_reload() {
        let (dir, store) = temp_store();
        let alice = store.create_profile("Alice", ColorTag::Blue);
        let bob = store.create_profile("Bob", ColorTag::Red);
        store.set_active(Some(bob.id)).unwrap();

        let reloaded = ProfileStore::open(dir.path().join("auth.json"));
        let profiles = reloaded.profiles();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].id, alice.id);
        assert_eq!(reloaded.active_profile().unwrap().id, bob.id);
    }

    #[test]
    fn test_update_preserves_created_at() {
        let (_dir, store) = temp_store();
        let mut profile = store.create_profile("Alice", ColorTag::Blue);
        let created = profile.created_at;

        profile.display_name = "Alicia".to_string();
        profile.created_at = 0;
        let updated = store.update_profile(profile).unwrap();

        assert_eq!(updated.display_name, "Alicia");
        assert_eq!(updated.created_at, created);
        assert!(updated.updated_at >= created);
    }

    #[test]
    fn test_delete_clears_active() {
        let (_dir, store) = temp_store();
        let profile = store.create_profile("Alice", ColorTag::Blue);
        store.set_active(Some(profile.id)).unwrap();

        store.delete_profile(profile.id).unwrap();
        assert!(store.active_profile().is_none());
        assert!(store.profiles().is_empty());
    }

    #[test]
    fn test_set_active_requires_existing_profile() {
        let (_dir, store) = temp_store();
        assert!(store.set_active(Some(Uuid::new_v4())).is_err());
        assert!(store.set_active(None).is_ok());
    }
}
