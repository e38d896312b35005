//! Capability traits implemented by the infrastructure layer.

use super::envelope::SyncMessage;
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Key/value durable storage shared by all replicas.
///
/// Values are opaque strings; the gateway owns their encoding.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Returns `Ok(None)` when the key has never been written.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Mutual exclusion over a named critical section, shared across replicas.
#[async_trait]
pub trait PersistLock: Send + Sync {
    /// Waits until the lock is held.
    async fn acquire(&self, name: &str) -> Result<Box<dyn LockLease>>;
}

/// A held lock. Dropping without `release` frees native locks but leaves
/// advisory records to expire on their own.
#[async_trait]
pub trait LockLease: Send {
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Fan-out of "new revision persisted" messages.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn publish(&self, message: &SyncMessage) -> Result<()>;

    /// Receives every message later published for `key`, including the
    /// subscriber's own; receivers filter by `from`.
    fn subscribe(&self, key: &str) -> Result<broadcast::Receiver<SyncMessage>>;
}
