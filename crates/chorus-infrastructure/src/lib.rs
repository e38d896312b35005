//! Adapters behind the `chorus-core` ports: durable stores, locks,
//! notifiers, versioned DTOs and configuration files.

pub mod config_service;
pub mod dto;
pub mod lock;
pub mod notify;
pub mod paths;
pub mod storage;

pub use config_service::ConfigService;
pub use dto::{ChatCodec, ProfileCodec};
pub use lock::{FileLock, LocalLock, TtlLock};
pub use notify::{BroadcastHub, PingNotifier};
pub use paths::ChorusPaths;
pub use storage::{FileStore, MemoryStore, TieredStore};
