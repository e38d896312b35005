//! Advisory lock kept as a timestamp record in the shared store.
//!
//! Used where no native lock reaches every replica. The check and the claim
//! are two separate store operations, so two replicas can both win a race;
//! a holder that outlives the TTL can also be overtaken. Both are accepted.

use async_trait::async_trait;
use chorus_core::error::Result;
use chorus_core::sync::{Backoff, Clock, DurableStore, LockLease, PersistLock, retry_with_jitter};
use std::sync::Arc;
use std::time::Duration;

/// Store key of the lock record for `name`.
pub fn lock_record_key(name: &str) -> String {
    format!("{}:lock", name)
}

pub struct TtlLock {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    backoff: Backoff,
}

impl TtlLock {
    pub fn new(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// One claim attempt. `Ok(false)` means the record is held and fresh.
    async fn try_claim(&self, record_key: &str) -> Result<bool> {
        let now = self.clock.now_millis();
        let held_since = self
            .store
            .get(record_key)
            .await?
            .and_then(|raw| raw.trim().parse::<i64>().ok());

        if let Some(since) = held_since {
            if now.saturating_sub(since) < self.ttl.as_millis() as i64 {
                return Ok(false);
            }
            tracing::debug!("[TtlLock] Taking over expired lock {}", record_key);
        }

        self.store.set(record_key, &now.to_string()).await?;
        Ok(true)
    }
}

struct TtlLease {
    store: Arc<dyn DurableStore>,
    record_key: String,
}

#[async_trait]
impl LockLease for TtlLease {
    async fn release(self: Box<Self>) -> Result<()> {
        self.store.remove(&self.record_key).await
    }
}

#[async_trait]
impl PersistLock for TtlLock {
    /// Store errors count as contention and are retried.
    async fn acquire(&self, name: &str) -> Result<Box<dyn LockLease>> {
        let record_key = lock_record_key(name);
        let key = record_key.as_str();
        retry_with_jitter(self.backoff, move || async move {
            match self.try_claim(key).await {
                Ok(true) => Ok(Some(())),
                Ok(false) => Ok(None),
                Err(e) => {
                    tracing::warn!("[TtlLock] Claim of {} failed, retrying: {}", key, e);
                    Ok(None)
                }
            }
        })
        .await?;

        Ok(Box::new(TtlLease {
            store: self.store.clone(),
            record_key,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chorus_core::sync::ManualClock;

    fn ttl_lock(store: &MemoryStore, clock: &ManualClock, max_attempts: u32) -> TtlLock {
        TtlLock::new(
            Arc::new(store.clone()),
            Arc::new(clock.clone()),
            Duration::from_millis(2500),
        )
        .with_backoff(Backoff::default().with_max_attempts(max_attempts))
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_writes_and_release_removes_record() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(10_000);
        let lock = ttl_lock(&store, &clock, 3);

        let lease = lock.acquire("chat:persist").await.unwrap();
        assert_eq!(
            store.get("chat:persist:lock").await.unwrap().as_deref(),
            Some("10000")
        );

        lease.release().await.unwrap();
        assert!(store.get("chat:persist:lock").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_record_excludes_other_holder() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(10_000);
        let first = ttl_lock(&store, &clock, 3);
        let second = ttl_lock(&store, &clock, 3);

        let _held = first.acquire("chat:persist").await.unwrap();
        let err = match second.acquire("chat:persist").await {
            Ok(_) => panic!("lock should be held"),
            Err(e) => e,
        };
        assert!(err.is_lock());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_record_is_taken_over() {
        let store = MemoryStore::new();
        let clock = ManualClock::new(10_000);
        let first = ttl_lock(&store, &clock, 3);
        let second = ttl_lock(&store, &clock, 3);

        let _crashed = first.acquire("chat:persist").await.unwrap();
        clock.advance(2_500);
        let lease = second.acquire("chat:persist").await.unwrap();
        assert_eq!(
            store.get("chat:persist:lock").await.unwrap().as_deref(),
            Some("12500")
        );
        lease.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_record_is_ignored() {
        let store = MemoryStore::new();
        store.set("chat:persist:lock", "not-a-number").await.unwrap();
        let clock = ManualClock::new(0);
        let lock = ttl_lock(&store, &clock, 1);
        lock.acquire("chat:persist").await.unwrap();
    }
}
