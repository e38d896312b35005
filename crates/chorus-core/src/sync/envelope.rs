//! Wire formats shared by every replica: the stored envelope and the
//! change notification.

use serde::{Deserialize, Serialize};

/// Revision-stamped wrapper around a persisted projection.
///
/// ```json
/// { "snapshot": {..}, "schemaVersion": 2, "revision": 7, "updatedAt": 1700000000000, "writer": "a1b2" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub snapshot: serde_json::Value,
    pub schema_version: u32,
    pub revision: u64,
    pub updated_at: i64,
    /// Replica id of the last writer.
    pub writer: String,
}

/// Notification sent after a new revision hits the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SyncMessage {
    Persisted {
        key: String,
        revision: u64,
        from: String,
    },
}

impl SyncMessage {
    pub fn persisted(key: impl Into<String>, revision: u64, from: impl Into<String>) -> Self {
        Self::Persisted {
            key: key.into(),
            revision,
            from: from.into(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Persisted { key, .. } => key,
        }
    }

    pub fn revision(&self) -> u64 {
        match self {
            Self::Persisted { revision, .. } => *revision,
        }
    }

    pub fn from(&self) -> &str {
        match self {
            Self::Persisted { from, .. } => from,
        }
    }
}

/// Ping record written by the store-backed notifier. `ts` makes every ping
/// distinct even when the message repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRecord {
    pub message: SyncMessage,
    pub ts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_field_names() {
        let envelope = Envelope {
            snapshot: json!({"sessions": []}),
            schema_version: 2,
            revision: 3,
            updated_at: 4,
            writer: "w".to_string(),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"snapshot": {"sessions": []}, "schemaVersion": 2, "revision": 3, "updatedAt": 4, "writer": "w"})
        );
    }

    #[test]
    fn test_message_shape() {
        let msg = SyncMessage::persisted("chat", 5, "tab-1");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "persisted", "key": "chat", "revision": 5, "from": "tab-1"})
        );
    }

    #[test]
    fn test_ping_record_round_trip() {
        let ping = PingRecord {
            message: SyncMessage::persisted("chat", 1, "a"),
            ts: 99,
        };
        let text = serde_json::to_string(&ping).unwrap();
        let back: PingRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, ping);
        assert!(text.contains("\"ts\":99"));
    }
}
