use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which exclusivity lock guards the persist cycle.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    /// OS file lock, shared by every process using the same data directory.
    #[default]
    Native,
    /// In-process mutex, shared by replicas living in one process.
    Local,
    /// Advisory timestamp record with a TTL, stored in the durable store.
    Ttl,
}

/// How sibling replicas learn about new revisions.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifierStrategy {
    /// In-process broadcast channel.
    #[default]
    Broadcast,
    /// Ping record in the shared store, polled by subscribers.
    Ping,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    pub debounce_ms: u64,
    pub lock_ttl_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_jitter_ms: u64,
    pub ping_poll_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            lock_ttl_ms: 2500,
            backoff_base_ms: 50,
            backoff_jitter_ms: 50,
            ping_poll_ms: 200,
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn ping_poll(&self) -> Duration {
        Duration::from_millis(self.ping_poll_ms)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Primary tier directory. Falls back to the platform data dir when unset.
    pub data_dir: Option<PathBuf>,
    /// Secondary tier directory. An in-memory tier is used when unset.
    pub secondary_dir: Option<PathBuf>,
    pub lock: LockStrategy,
    pub notifier: NotifierStrategy,
}

/// Root of `chorus.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ChorusConfig {
    pub sync: SyncConfig,
    pub storage: StorageConfig,
}
