//! Wiring of stores, locks and notifiers into running replicas.

use crate::chat::ChatReplica;
use crate::profile::ProfileReplica;
use crate::replica::{Replica, ReplicaParts};
use chorus_core::config::{ChorusConfig, LockStrategy, NotifierStrategy};
use chorus_core::error::Result;
use chorus_core::sync::{
    Backoff, ChangeNotifier, Clock, DurableStore, PersistLock, PersistenceGateway, Replicated,
    SnapshotCodec, SystemClock,
};
use chorus_infrastructure::{
    BroadcastHub, ChorusPaths, FileLock, FileStore, LocalLock, MemoryStore, PingNotifier,
    TieredStore, TtlLock,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Adapters shared by every replica opened from the same context.
///
/// Replicas opened from one context see each other as siblings. Separate
/// processes become siblings when their contexts point at the same data
/// directory and use a cross-process lock and notifier.
#[derive(Clone)]
pub struct SyncContext {
    store: Arc<dyn DurableStore>,
    lock: Arc<dyn PersistLock>,
    notifier: Arc<dyn ChangeNotifier>,
    clock: Arc<dyn Clock>,
    debounce: Duration,
}

impl SyncContext {
    pub fn new(
        store: Arc<dyn DurableStore>,
        lock: Arc<dyn PersistLock>,
        notifier: Arc<dyn ChangeNotifier>,
        clock: Arc<dyn Clock>,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            lock,
            notifier,
            clock,
            debounce,
        }
    }

    /// Single-process context with nothing on disk.
    pub fn in_memory(clock: Arc<dyn Clock>, debounce: Duration) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(LocalLock::new()),
            Arc::new(BroadcastHub::new()),
            clock,
            debounce,
        )
    }

    /// Builds the adapters named in `config`.
    pub fn from_config(config: &ChorusConfig) -> Result<Self> {
        let data_dir = ChorusPaths::data_dir(config)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let primary: Arc<dyn DurableStore> =
            Arc::new(FileStore::new(ChorusPaths::store_dir(&data_dir)));
        let secondary: Arc<dyn DurableStore> = match &config.storage.secondary_dir {
            Some(dir) => Arc::new(FileStore::new(dir.clone())),
            None => Arc::new(MemoryStore::new()),
        };
        let store: Arc<dyn DurableStore> = Arc::new(TieredStore::new(primary, secondary));

        let lock: Arc<dyn PersistLock> = match config.storage.lock {
            LockStrategy::Native => Arc::new(FileLock::new(ChorusPaths::lock_dir(&data_dir))),
            LockStrategy::Local => Arc::new(LocalLock::new()),
            LockStrategy::Ttl => {
                let backoff = Backoff::new(
                    Duration::from_millis(config.sync.backoff_base_ms),
                    Duration::from_millis(config.sync.backoff_jitter_ms),
                );
                Arc::new(
                    TtlLock::new(store.clone(), clock.clone(), config.sync.lock_ttl())
                        .with_backoff(backoff),
                )
            }
        };

        let notifier: Arc<dyn ChangeNotifier> = match config.storage.notifier {
            NotifierStrategy::Broadcast => Arc::new(BroadcastHub::new()),
            NotifierStrategy::Ping => Arc::new(PingNotifier::new(
                store.clone(),
                clock.clone(),
                config.sync.ping_poll(),
            )),
        };

        tracing::info!(
            "[Bootstrap] Sync context at {:?} (lock: {:?}, notifier: {:?})",
            data_dir,
            config.storage.lock,
            config.storage.notifier
        );
        Ok(Self::new(store, lock, notifier, clock, config.sync.debounce()))
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn builder(&self, key: impl Into<String>) -> ReplicaBuilder {
        ReplicaBuilder {
            context: self.clone(),
            key: key.into(),
            replica_id: None,
            debounce: self.debounce,
        }
    }

    pub async fn open_chat(&self) -> Result<ChatReplica> {
        ChatReplica::open(self.builder(crate::chat::CHAT_KEY)).await
    }

    pub async fn open_profiles(&self) -> Result<ProfileReplica> {
        ProfileReplica::open(self.builder(crate::profile::PROFILE_KEY)).await
    }
}

/// Opens one replica of one key.
pub struct ReplicaBuilder {
    context: SyncContext,
    key: String,
    replica_id: Option<String>,
    debounce: Duration,
}

impl ReplicaBuilder {
    /// Fixes the replica id. A random one is used otherwise.
    pub fn replica_id(mut self, id: impl Into<String>) -> Self {
        self.replica_id = Some(id.into());
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn now_millis(&self) -> i64 {
        self.context.clock.now_millis()
    }

    pub async fn open<R: Replicated>(
        self,
        codec: Arc<dyn SnapshotCodec<R::Persisted>>,
        initial: R,
    ) -> Result<Replica<R>> {
        let replica_id = self
            .replica_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let ctx = self.context;
        let gateway = PersistenceGateway::new(
            ctx.store,
            ctx.lock,
            ctx.notifier.clone(),
            ctx.clock,
            replica_id,
        );
        let parts = ReplicaParts {
            key: self.key,
            gateway,
            codec,
            notifier: ctx.notifier,
            debounce: self.debounce,
        };
        Replica::open(parts, initial).await
    }
}
