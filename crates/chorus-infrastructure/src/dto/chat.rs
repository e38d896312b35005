//! Chat projection DTOs and migrations

use chorus_core::error::Result;
use chorus_core::session::{ChatMessage, ChatStat, PersistedChat, Session};
use chorus_core::sync::SnapshotCodec;
use serde::{Deserialize, Serialize};
use version_migrate::{FromDomain, IntoDomain, MigratesTo, Versioned};

/// Entity name registered with the migrator.
pub const CHAT_ENTITY: &str = "chat";

/// Written to `Envelope::schema_version` for chat envelopes.
pub const CHAT_SCHEMA_VERSION: u32 = 2;

/// Session layout before pinning existed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionV1_0_0 {
    pub id: String,
    pub topic: String,
    #[serde(default)]
    pub memory_prompt: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stat: ChatStat,
    pub last_update: i64,
    #[serde(default)]
    pub last_summarize_index: usize,
    #[serde(default)]
    pub clear_context_index: Option<usize>,
}

/// Session layout with pin state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionV1_1_0 {
    pub id: String,
    pub topic: String,
    #[serde(default)]
    pub memory_prompt: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stat: ChatStat,
    pub last_update: i64,
    #[serde(default)]
    pub last_summarize_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_context_index: Option<usize>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub pinned_at: Option<i64>,
}

/// Chat projection V1.0.0: sessions without pin fields.
#[derive(Debug, Clone, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct ChatStateV1_0_0 {
    #[serde(default)]
    pub sessions: Vec<SessionV1_0_0>,
}

/// Chat projection V1.1.0: adds `pinned` / `pinned_at` to every session.
#[derive(Debug, Clone, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.1.0")]
pub struct ChatStateV1_1_0 {
    #[serde(default)]
    pub sessions: Vec<SessionV1_1_0>,
}

// ============================================================================
// Migration implementations
// ============================================================================

/// Existing sessions start unpinned.
impl MigratesTo<ChatStateV1_1_0> for ChatStateV1_0_0 {
    fn migrate(self) -> ChatStateV1_1_0 {
        ChatStateV1_1_0 {
            sessions: self
                .sessions
                .into_iter()
                .map(|s| SessionV1_1_0 {
                    id: s.id,
                    topic: s.topic,
                    memory_prompt: s.memory_prompt,
                    messages: s.messages,
                    stat: s.stat,
                    last_update: s.last_update,
                    last_summarize_index: s.last_summarize_index,
                    clear_context_index: s.clear_context_index,
                    pinned: false,
                    pinned_at: None,
                })
                .collect(),
        }
    }
}

// ============================================================================
// Domain model conversions
// ============================================================================

impl IntoDomain<PersistedChat> for ChatStateV1_1_0 {
    fn into_domain(self) -> PersistedChat {
        PersistedChat::new(
            self.sessions
                .into_iter()
                .map(|s| Session {
                    id: s.id,
                    topic: s.topic,
                    memory_prompt: s.memory_prompt,
                    messages: s.messages,
                    stat: s.stat,
                    last_update: s.last_update,
                    last_summarize_index: s.last_summarize_index,
                    clear_context_index: s.clear_context_index,
                    // a pin time without the flag is meaningless; a flag
                    // without a time is dated by the last update
                    pinned_at: if s.pinned {
                        s.pinned_at.or(Some(s.last_update))
                    } else {
                        None
                    },
                    pinned: s.pinned,
                })
                .collect(),
        )
    }
}

impl FromDomain<PersistedChat> for ChatStateV1_1_0 {
    fn from_domain(chat: PersistedChat) -> Self {
        ChatStateV1_1_0 {
            sessions: chat
                .sessions
                .into_iter()
                .map(|s| SessionV1_1_0 {
                    id: s.id,
                    topic: s.topic,
                    memory_prompt: s.memory_prompt,
                    messages: s.messages,
                    stat: s.stat,
                    last_update: s.last_update,
                    last_summarize_index: s.last_summarize_index,
                    clear_context_index: s.clear_context_index,
                    pinned: s.pinned,
                    pinned_at: s.pinned_at,
                })
                .collect(),
        }
    }
}

// ============================================================================
// Migrator factory
// ============================================================================

/// Creates the migrator for chat projections.
///
/// # Migration Path
///
/// - V1.0.0 → V1.1.0: adds pin state, unpinned by default
/// - V1.1.0 → PersistedChat
pub fn create_chat_migrator() -> version_migrate::Migrator {
    let mut migrator = version_migrate::Migrator::builder().build();
    let path = version_migrate::Migrator::define(CHAT_ENTITY)
        .from::<ChatStateV1_0_0>()
        .step::<ChatStateV1_1_0>()
        .into_with_save::<PersistedChat>();
    migrator
        .register(path)
        .expect("Failed to register chat migration path");
    migrator
}

/// [`SnapshotCodec`] for the chat projection, with migration on decode.
pub struct ChatCodec {
    migrator: version_migrate::Migrator,
}

impl ChatCodec {
    pub fn new() -> Self {
        Self {
            migrator: create_chat_migrator(),
        }
    }
}

impl Default for ChatCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCodec<PersistedChat> for ChatCodec {
    fn schema_version(&self) -> u32 {
        CHAT_SCHEMA_VERSION
    }

    fn encode(&self, value: &PersistedChat) -> Result<serde_json::Value> {
        let json = self.migrator.save_domain_flat(CHAT_ENTITY, value)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn decode(&self, mut value: serde_json::Value) -> Result<PersistedChat> {
        super::assume_version(&mut value, "1.0.0");
        Ok(self.migrator.load_flat_from(CHAT_ENTITY, value)?)
    }
}
