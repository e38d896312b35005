use async_trait::async_trait;
use chorus_core::error::Result;
use chorus_core::sync::{LockLease, PersistLock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// In-process lock, one async mutex per name. Clones share the registry.
#[derive(Debug, Clone, Default)]
pub struct LocalLock {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl LocalLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

struct LocalLease(OwnedMutexGuard<()>);

#[async_trait]
impl LockLease for LocalLease {
    async fn release(self: Box<Self>) -> Result<()> {
        drop(self.0);
        Ok(())
    }
}

#[async_trait]
impl PersistLock for LocalLock {
    async fn acquire(&self, name: &str) -> Result<Box<dyn LockLease>> {
        let guard = self.slot(name).lock_owned().await;
        Ok(Box::new(LocalLease(guard)))
    }
}
