//! Chat message types.
//!
//! The sync engine never interprets message content. It only looks at the id,
//! the timestamp and the streaming/error flags when merging.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    #[default]
    User,
    /// Message from the AI assistant.
    Assistant,
    /// System-generated message.
    System,
}

/// Function invocation carried by a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ToolFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A tool call recorded on an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ToolCall {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<ToolFunction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

/// A single message in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: String,
    pub role: MessageRole,
    /// Opaque content payload.
    pub content: String,
    /// Creation time, RFC 3339.
    pub date: String,
    /// True while the message is still being produced.
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolCall>,
}

impl ChatMessage {
    /// Creates a finished message stamped at `now_millis`.
    pub fn new(role: MessageRole, content: impl Into<String>, now_millis: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            date: format_date(now_millis),
            streaming: false,
            is_error: false,
            model: None,
            tools: Vec::new(),
        }
    }

    /// Creates an empty assistant message that is still streaming.
    pub fn streaming_reply(model: Option<String>, now_millis: i64) -> Self {
        Self {
            streaming: true,
            model,
            ..Self::new(MessageRole::Assistant, "", now_millis)
        }
    }

    /// Millisecond timestamp used for merge ordering. Unparsable dates are 0.
    pub fn timestamp_millis(&self) -> i64 {
        parse_date(&self.date)
    }
}

/// Formats epoch milliseconds as an RFC 3339 string.
pub fn format_date(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.to_rfc3339(),
        None => String::new(),
    }
}

/// Parses a message date back to epoch milliseconds.
///
/// Accepts RFC 3339 and the plain `YYYY-MM-DD HH:MM:SS` form older data used.
pub fn parse_date(date: &str) -> i64 {
    if date.is_empty() {
        return 0;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return dt.timestamp_millis();
    }
    NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc().timestamp_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_round_trip_keeps_millis() {
        let date = format_date(1_700_000_000_123);
        assert_eq!(parse_date(&date), 1_700_000_000_123);
    }

    #[test]
    fn test_unparsable_date_is_zero() {
        assert_eq!(parse_date(""), 0);
        assert_eq!(parse_date("yesterday"), 0);
    }

    #[test]
    fn test_plain_date_format() {
        assert_eq!(parse_date("1970-01-01 00:00:01"), 1000);
    }

    #[test]
    fn test_streaming_reply_defaults() {
        let msg = ChatMessage::streaming_reply(Some("gpt".to_string()), 5_000);
        assert!(msg.streaming);
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(msg.timestamp_millis(), 5_000);
        assert!(msg.content.is_empty());
    }
}
