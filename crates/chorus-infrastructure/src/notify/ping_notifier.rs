//! Notifier for replicas that share only a store.
//!
//! Publishing writes a `<key>:ping` record. Each subscribed key gets one
//! poller task that watches the record and forwards every new ping.

use async_trait::async_trait;
use chorus_core::error::Result;
use chorus_core::sync::{ChangeNotifier, Clock, DurableStore, PingRecord, SyncMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const CHANNEL_CAPACITY: usize = 64;

/// Store key of the ping record for `key`.
pub fn ping_record_key(key: &str) -> String {
    format!("{}:ping", key)
}

pub struct PingNotifier {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    channels: Mutex<HashMap<String, broadcast::Sender<SyncMessage>>>,
    cancel: CancellationToken,
}

impl PingNotifier {
    pub fn new(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>, poll_interval: Duration) -> Self {
        Self {
            store,
            clock,
            poll_interval,
            channels: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Stops every poller. Dropping the notifier does the same.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn spawn_poller(&self, key: &str, sender: broadcast::Sender<SyncMessage>) {
        let store = self.store.clone();
        let cancel = self.cancel.child_token();
        let interval = self.poll_interval;
        let record_key = ping_record_key(key);

        tokio::spawn(async move {
            // Pings that predate the subscription are not replayed.
            let mut last_seen = store.get(&record_key).await.ok().flatten();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let raw = match store.get(&record_key).await {
                    Ok(Some(raw)) => raw,
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::warn!("[PingNotifier] Poll of {} failed: {}", record_key, e);
                        continue;
                    }
                };
                if last_seen.as_deref() == Some(raw.as_str()) {
                    continue;
                }
                match serde_json::from_str::<PingRecord>(&raw) {
                    Ok(ping) => {
                        let _ = sender.send(ping.message);
                    }
                    Err(e) => {
                        tracing::warn!("[PingNotifier] Ignoring malformed ping {}: {}", record_key, e);
                    }
                }
                last_seen = Some(raw);
            }
            tracing::debug!("[PingNotifier] Poller for {} stopped", record_key);
        });
    }
}

impl Drop for PingNotifier {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl ChangeNotifier for PingNotifier {
    async fn publish(&self, message: &SyncMessage) -> Result<()> {
        let record = PingRecord {
            message: message.clone(),
            ts: self.clock.now_millis(),
        };
        let raw = serde_json::to_string(&record)?;
        self.store.set(&ping_record_key(message.key()), &raw).await
    }

    /// Must be called from within a tokio runtime.
    fn subscribe(&self, key: &str) -> Result<broadcast::Receiver<SyncMessage>> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = channels.get(key) {
            return Ok(sender.subscribe());
        }
        let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        channels.insert(key.to_string(), sender.clone());
        self.spawn_poller(key, sender);
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chorus_core::sync::ManualClock;

    fn notifier(store: &MemoryStore, clock: &ManualClock) -> PingNotifier {
        PingNotifier::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            Duration::from_millis(20),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_reaches_other_notifier() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(1);
        let sender = notifier(&store, &clock);
        let listener = notifier(&store, &clock);

        let mut rx = listener.subscribe("chat").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        sender
            .publish(&SyncMessage::persisted("chat", 4, "tab-a"))
            .await
            .unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got, SyncMessage::persisted("chat", 4, "tab-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_message_is_delivered_again() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(1);
        let sender = notifier(&store, &clock);
        let listener = notifier(&store, &clock);
        let mut rx = listener.subscribe("chat").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let message = SyncMessage::persisted("chat", 1, "tab-a");
        sender.publish(&message).await.unwrap();
        rx.recv().await.unwrap();

        clock.advance(1);
        sender.publish(&message).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), message);
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_ping_is_not_replayed() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(1);
        notifier(&store, &clock)
            .publish(&SyncMessage::persisted("chat", 1, "tab-a"))
            .await
            .unwrap();

        let listener = notifier(&store, &clock);
        let mut rx = listener.subscribe("chat").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }
}
