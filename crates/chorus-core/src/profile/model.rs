//! Named user profiles, replicated under their own key.

use crate::sync::replicated::Replicated;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
}

/// Stored part of the profile state. Everything except the hydration marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PersistedProfiles {
    pub profiles: Vec<Profile>,
    pub current_profile_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileSnapshot {
    pub profiles: Vec<Profile>,
    pub current_profile_id: Option<String>,
    pub hydrated: bool,
}

impl ProfileSnapshot {
    /// Adds a profile and selects it.
    pub fn create_profile(&mut self, name: impl Into<String>) -> String {
        let profile = Profile {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
        };
        let id = profile.id.clone();
        self.profiles.push(profile);
        self.current_profile_id = Some(id.clone());
        id
    }

    /// Deleting the selected profile falls back to no selection.
    pub fn delete_profile(&mut self, id: &str) {
        self.profiles.retain(|p| p.id != id);
        if self.current_profile_id.as_deref() == Some(id) {
            self.current_profile_id = None;
        }
    }

    pub fn select_profile(&mut self, id: Option<String>) {
        self.current_profile_id = id;
    }

    pub fn current_profile(&self) -> Option<&Profile> {
        let id = self.current_profile_id.as_deref()?;
        self.profiles.iter().find(|p| p.id == id)
    }
}

impl Replicated for ProfileSnapshot {
    type Persisted = PersistedProfiles;

    fn persisted(&self) -> PersistedProfiles {
        PersistedProfiles {
            profiles: self.profiles.clone(),
            current_profile_id: self.current_profile_id.clone(),
        }
    }

    fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    fn mark_hydrated(&mut self) {
        self.hydrated = true;
    }

    /// Union by id. A shared id takes the remote name; the remote selection
    /// wins when it names a profile that exists after the merge.
    fn reconcile(&self, remote: PersistedProfiles) -> Self {
        let mut profiles: Vec<Profile> = self
            .profiles
            .iter()
            .map(|local| {
                remote
                    .profiles
                    .iter()
                    .find(|r| r.id == local.id)
                    .unwrap_or(local)
                    .clone()
            })
            .collect();
        let known: HashSet<String> = profiles.iter().map(|p| p.id.clone()).collect();
        profiles.extend(
            remote
                .profiles
                .iter()
                .filter(|r| !known.contains(&r.id))
                .cloned(),
        );

        let remote_current = remote
            .current_profile_id
            .filter(|id| profiles.iter().any(|p| &p.id == id));
        let current_profile_id = remote_current.or_else(|| self.current_profile_id.clone());

        Self {
            profiles,
            current_profile_id,
            hydrated: self.hydrated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str, name: &str) -> Profile {
        Profile {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_create_selects_new_profile() {
        let mut state = ProfileSnapshot::default();
        let id = state.create_profile("work");
        assert_eq!(state.current_profile().unwrap().id, id);
    }

    #[test]
    fn test_deleting_selected_profile_clears_selection() {
        let mut state = ProfileSnapshot::default();
        let id = state.create_profile("work");
        state.create_profile("home");
        state.select_profile(Some(id.clone()));

        state.delete_profile(&id);
        assert!(state.current_profile_id.is_none());
        assert_eq!(state.profiles.len(), 1);
    }

    #[test]
    fn test_reconcile_unions_profiles() {
        let local = ProfileSnapshot {
            profiles: vec![profile("a", "local a"), profile("b", "b")],
            current_profile_id: Some("b".to_string()),
            hydrated: true,
        };
        let remote = PersistedProfiles {
            profiles: vec![profile("a", "remote a"), profile("c", "c")],
            current_profile_id: Some("c".to_string()),
        };

        let merged = local.reconcile(remote);
        let names: Vec<_> = merged.profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["remote a", "b", "c"]);
        assert_eq!(merged.current_profile_id.as_deref(), Some("c"));
    }

    #[test]
    fn test_reconcile_keeps_local_selection_without_remote_one() {
        let local = ProfileSnapshot {
            profiles: vec![profile("a", "a")],
            current_profile_id: Some("a".to_string()),
            hydrated: true,
        };
        let merged = local.reconcile(PersistedProfiles::default());
        assert_eq!(merged, local);
    }
}
