//! Profile projection DTOs

use chorus_core::error::Result;
use chorus_core::profile::{PersistedProfiles, Profile};
use chorus_core::sync::SnapshotCodec;
use serde::{Deserialize, Serialize};
use version_migrate::{FromDomain, IntoDomain, Versioned};

pub const PROFILE_ENTITY: &str = "profile";
pub const PROFILE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileV1_0_0 {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct ProfileStateV1_0_0 {
    #[serde(default)]
    pub profiles: Vec<ProfileV1_0_0>,
    #[serde(default)]
    pub current_profile_id: Option<String>,
}

impl IntoDomain<PersistedProfiles> for ProfileStateV1_0_0 {
    fn into_domain(self) -> PersistedProfiles {
        PersistedProfiles {
            profiles: self
                .profiles
                .into_iter()
                .map(|p| Profile {
                    id: p.id,
                    name: p.name,
                })
                .collect(),
            current_profile_id: self.current_profile_id,
        }
    }
}

impl FromDomain<PersistedProfiles> for ProfileStateV1_0_0 {
    fn from_domain(state: PersistedProfiles) -> Self {
        ProfileStateV1_0_0 {
            profiles: state
                .profiles
                .into_iter()
                .map(|p| ProfileV1_0_0 {
                    id: p.id,
                    name: p.name,
                })
                .collect(),
            current_profile_id: state.current_profile_id,
        }
    }
}

/// Creates the migrator for profile projections.
pub fn create_profile_migrator() -> version_migrate::Migrator {
    let mut migrator = version_migrate::Migrator::builder().build();
    let path = version_migrate::Migrator::define(PROFILE_ENTITY)
        .from::<ProfileStateV1_0_0>()
        .into_with_save::<PersistedProfiles>();
    migrator
        .register(path)
        .expect("Failed to register profile migration path");
    migrator
}

pub struct ProfileCodec {
    migrator: version_migrate::Migrator,
}

impl ProfileCodec {
    pub fn new() -> Self {
        Self {
            migrator: create_profile_migrator(),
        }
    }
}

impl Default for ProfileCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCodec<PersistedProfiles> for ProfileCodec {
    fn schema_version(&self) -> u32 {
        PROFILE_SCHEMA_VERSION
    }

    fn encode(&self, value: &PersistedProfiles) -> Result<serde_json::Value> {
        let json = self.migrator.save_domain_flat(PROFILE_ENTITY, value)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn decode(&self, mut value: serde_json::Value) -> Result<PersistedProfiles> {
        super::assume_version(&mut value, "1.0.0");
        Ok(self.migrator.load_flat_from(PROFILE_ENTITY, value)?)
    }
}
