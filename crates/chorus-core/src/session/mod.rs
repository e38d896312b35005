//! Chat sessions: the replicated domain data.

pub mod commands;
pub mod message;
pub mod model;
pub mod snapshot;

pub use commands::{DeletedSession, ExchangeIds};
pub use message::{ChatMessage, MessageRole, ToolCall, ToolFunction};
pub use model::{ChatStat, DEFAULT_TOPIC, Session};
pub use snapshot::{ChatSnapshot, MenuPosition, MenuState, PersistedChat, sort_sessions};
