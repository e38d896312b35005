//! Data Transfer Objects (DTOs) for persisted projections.
//!
//! Each projection is stored in the flat `version-migrate` format: the DTO
//! fields plus a `"version"` string. Older layouts are migrated on read.
//!
//! ### Chat Version History
//! - **1.0.0**: Sessions without pin state
//! - **1.1.0**: Added `pinned` / `pinned_at`
//!
//! ### Profile Version History
//! - **1.0.0**: Initial schema

mod chat;
mod profile;

pub use chat::{
    CHAT_ENTITY, CHAT_SCHEMA_VERSION, ChatCodec, ChatStateV1_0_0, ChatStateV1_1_0,
    create_chat_migrator,
};
pub use profile::{
    PROFILE_ENTITY, PROFILE_SCHEMA_VERSION, ProfileCodec, ProfileStateV1_0_0,
    create_profile_migrator,
};

/// Tags a value written before versioning with `version`.
fn assume_version(value: &mut serde_json::Value, version: &str) {
    if let serde_json::Value::Object(map) = value {
        map.entry("version")
            .or_insert_with(|| serde_json::Value::String(version.to_string()));
    }
}
