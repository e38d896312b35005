//! Revision-stamped reads and writes of the durable envelope.

use super::clock::Clock;
use super::envelope::{Envelope, SyncMessage};
use super::ports::{ChangeNotifier, DurableStore, PersistLock};
use crate::error::Result;
use serde_json::Value;
use std::sync::Arc;

/// Name of the lock guarding the persist cycle of `key`.
pub fn persist_lock_name(key: &str) -> String {
    format!("{}:persist", key)
}

/// A projection ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistRequest {
    pub snapshot: Value,
    pub schema_version: u32,
    /// Whether the writing replica finished hydrating.
    pub hydrated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The replica had not hydrated yet; nothing was read or written.
    SkippedNotHydrated,
    /// Stored projection already matched; revision did not move.
    Unchanged { revision: u64 },
    Persisted { revision: u64 },
}

/// Owns the envelope format and the read-compare-write cycle.
pub struct PersistenceGateway {
    store: Arc<dyn DurableStore>,
    lock: Arc<dyn PersistLock>,
    notifier: Arc<dyn ChangeNotifier>,
    clock: Arc<dyn Clock>,
    writer: String,
}

impl PersistenceGateway {
    pub fn new(
        store: Arc<dyn DurableStore>,
        lock: Arc<dyn PersistLock>,
        notifier: Arc<dyn ChangeNotifier>,
        clock: Arc<dyn Clock>,
        writer: impl Into<String>,
    ) -> Self {
        Self {
            store,
            lock,
            notifier,
            clock,
            writer: writer.into(),
        }
    }

    /// Replica id stamped into envelopes and notifications.
    pub fn writer(&self) -> &str {
        &self.writer
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Writes `request` under `key` if it differs from what is stored.
    ///
    /// The whole read-compare-write runs under the `<key>:persist` lock, so
    /// revisions for a key never fork.
    pub async fn write(&self, key: &str, request: PersistRequest) -> Result<WriteOutcome> {
        if !request.hydrated {
            tracing::debug!("[Gateway] Skipping write before hydration: {}", key);
            return Ok(WriteOutcome::SkippedNotHydrated);
        }

        let lease = self.lock.acquire(&persist_lock_name(key)).await?;
        let outcome = self.write_locked(key, request).await;
        if let Err(e) = lease.release().await {
            tracing::warn!("[Gateway] Failed to release lock for {}: {}", key, e);
        }
        outcome
    }

    async fn write_locked(&self, key: &str, request: PersistRequest) -> Result<WriteOutcome> {
        let previous = self.read(key).await?;
        let previous_revision = previous.as_ref().map(|e| e.revision).unwrap_or(0);

        if let Some(previous) = &previous {
            let old_text = serde_json::to_string(&previous.snapshot)?;
            let new_text = serde_json::to_string(&request.snapshot)?;
            if old_text == new_text {
                tracing::debug!(
                    key,
                    revision = previous_revision,
                    "[Gateway] Projection unchanged, skipping write"
                );
                return Ok(WriteOutcome::Unchanged {
                    revision: previous_revision,
                });
            }
        }

        let revision = previous_revision + 1;
        let envelope = Envelope {
            snapshot: request.snapshot,
            schema_version: request.schema_version,
            revision,
            updated_at: self.clock.now_millis(),
            writer: self.writer.clone(),
        };
        self.store
            .set(key, &serde_json::to_string(&envelope)?)
            .await?;
        tracing::debug!(key, revision, writer = %self.writer, "[Gateway] Persisted");

        let message = SyncMessage::persisted(key, revision, &self.writer);
        if let Err(e) = self.notifier.publish(&message).await {
            tracing::warn!("[Gateway] Failed to notify siblings for {}: {}", key, e);
        }

        Ok(WriteOutcome::Persisted { revision })
    }

    /// Reads the stored envelope. A value that does not decode is logged and
    /// reported as absent.
    pub async fn read(&self, key: &str) -> Result<Option<Envelope>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<Envelope>(&raw) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                tracing::warn!("[Gateway] Ignoring malformed envelope for {}: {}", key, e);
                Ok(None)
            }
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}
