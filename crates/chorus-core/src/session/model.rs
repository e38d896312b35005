//! Session domain model.

use super::message::ChatMessage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic given to sessions nobody has named yet.
pub const DEFAULT_TOPIC: &str = "New Conversation";

/// Usage statistics accumulated for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChatStat {
    pub token_count: u64,
    pub word_count: u64,
    pub char_count: u64,
}

/// A chat session: an ordered list of messages plus its metadata.
///
/// `id` is assigned at creation and never changes. `pinned` and `pinned_at`
/// are only written together (see [`Session::pin`] / [`Session::unpin`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub topic: String,
    /// Summary of the conversation so far.
    #[serde(default)]
    pub memory_prompt: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stat: ChatStat,
    /// Last modification, epoch millis.
    pub last_update: i64,
    /// Messages before this index are covered by `memory_prompt`.
    #[serde(default)]
    pub last_summarize_index: usize,
    /// Messages before this index are excluded from the model context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_context_index: Option<usize>,
    #[serde(default)]
    pub pinned: bool,
    /// Pin time, epoch millis. `None` while unpinned.
    #[serde(default)]
    pub pinned_at: Option<i64>,
}

impl Session {
    pub fn new(now_millis: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            memory_prompt: String::new(),
            messages: Vec::new(),
            stat: ChatStat::default(),
            last_update: now_millis,
            last_summarize_index: 0,
            clear_context_index: None,
            pinned: false,
            pinned_at: None,
        }
    }

    pub fn with_topic(topic: impl Into<String>, now_millis: i64) -> Self {
        Self {
            topic: topic.into(),
            ..Self::new(now_millis)
        }
    }

    pub fn pin(&mut self, now_millis: i64) {
        self.pinned = true;
        self.pinned_at = Some(now_millis);
    }

    pub fn unpin(&mut self) {
        self.pinned = false;
        self.pinned_at = None;
    }

    /// Pin time used for ordering and merging; unpinned counts as 0.
    pub fn pin_time(&self) -> i64 {
        self.pinned_at.unwrap_or(0)
    }

    /// True for the untouched session a fresh replica boots with.
    pub fn is_placeholder(&self) -> bool {
        self.messages.is_empty()
            && self.topic == DEFAULT_TOPIC
            && !self.pinned
            && self.memory_prompt.is_empty()
    }

    pub fn message_index(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_and_unpin_move_together() {
        let mut session = Session::new(0);
        session.pin(42);
        assert!(session.pinned);
        assert_eq!(session.pinned_at, Some(42));

        session.unpin();
        assert!(!session.pinned);
        assert_eq!(session.pinned_at, None);
        assert_eq!(session.pin_time(), 0);
    }

    #[test]
    fn test_placeholder_detection() {
        let mut session = Session::new(0);
        assert!(session.is_placeholder());

        session.topic = "Renamed".to_string();
        assert!(!session.is_placeholder());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Session::new(0).id, Session::new(0).id);
    }
}
