use async_trait::async_trait;
use chorus_core::error::Result;
use chorus_core::sync::{ChangeNotifier, SyncMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// In-process fan-out, one broadcast channel per key. Clones share channels.
#[derive(Debug, Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<SyncMessage>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, key: &str) -> broadcast::Sender<SyncMessage> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl ChangeNotifier for BroadcastHub {
    async fn publish(&self, message: &SyncMessage) -> Result<()> {
        // No receivers is fine: nobody else is listening yet.
        let _ = self.sender(message.key()).send(message.clone());
        Ok(())
    }

    fn subscribe(&self, key: &str) -> Result<broadcast::Receiver<SyncMessage>> {
        Ok(self.sender(key).subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_are_routed_by_key() {
        let hub = BroadcastHub::new();
        let mut chat = hub.subscribe("chat").unwrap();
        let mut profile = hub.clone().subscribe("profile").unwrap();

        hub.publish(&SyncMessage::persisted("chat", 1, "a")).await.unwrap();

        assert_eq!(chat.recv().await.unwrap().revision(), 1);
        assert!(profile.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let hub = BroadcastHub::new();
        hub.publish(&SyncMessage::persisted("chat", 1, "a")).await.unwrap();
    }
}
