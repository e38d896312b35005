//! Runtime for one replicated key.
//!
//! A [`Replica`] owns the in-memory container for one storage key and two
//! background tasks: a flush driver that writes coalesced changes through
//! the gateway, and a listener that reconciles revisions written by
//! siblings. Both tasks hold only a weak reference and stop on shutdown.
//!
//! A replica whose first read of the store fails stays unhydrated, and so
//! writes nothing, until a retried read succeeds.

use chorus_core::error::Result;
use chorus_core::sync::{
    Admission, Backoff, ChangeNotifier, InFlightGuard, PersistRequest, PersistenceGateway,
    ReplicaContainer, Replicated, SnapshotCodec, SyncMessage, SyncPhase, WriteCoalescer,
    WriteOutcome,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Everything a replica needs, assembled by [`crate::bootstrap::ReplicaBuilder`].
pub struct ReplicaParts<R: Replicated> {
    pub key: String,
    pub gateway: PersistenceGateway,
    pub codec: Arc<dyn SnapshotCodec<R::Persisted>>,
    pub notifier: Arc<dyn ChangeNotifier>,
    pub debounce: Duration,
}

struct ReplicaInner<R: Replicated> {
    key: String,
    container: ReplicaContainer<R>,
    gateway: PersistenceGateway,
    codec: Arc<dyn SnapshotCodec<R::Persisted>>,
    guard: Mutex<InFlightGuard>,
    applied_revision: AtomicU64,
    phase: Mutex<SyncPhase>,
    coalescer: Mutex<WriteCoalescer<Arc<R>, Instant>>,
    wake: Arc<Notify>,
    debounce: Duration,
    cancel: CancellationToken,
    reconcile_serial: tokio::sync::Mutex<()>,
    flush_serial: tokio::sync::Mutex<()>,
}

/// Handle to a running replica. Clones share the same replica.
pub struct Replica<R: Replicated> {
    inner: Arc<ReplicaInner<R>>,
}

impl<R: Replicated> Clone for Replica<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Replicated> Replica<R> {
    /// Hydrates from the store and starts the background tasks.
    ///
    /// The notification subscription is taken before the store is read, so
    /// a revision written during hydration is not missed.
    pub async fn open(parts: ReplicaParts<R>, initial: R) -> Result<Self> {
        let receiver = parts.notifier.subscribe(&parts.key)?;
        let inner = Arc::new(ReplicaInner {
            key: parts.key,
            container: ReplicaContainer::new(initial),
            gateway: parts.gateway,
            codec: parts.codec,
            guard: Mutex::new(InFlightGuard::new()),
            applied_revision: AtomicU64::new(0),
            phase: Mutex::new(SyncPhase::Uninitialized),
            coalescer: Mutex::new(WriteCoalescer::new()),
            wake: Arc::new(Notify::new()),
            debounce: parts.debounce,
            cancel: CancellationToken::new(),
            reconcile_serial: tokio::sync::Mutex::new(()),
            flush_serial: tokio::sync::Mutex::new(()),
        });

        let weak = Arc::downgrade(&inner);
        inner.container.on_change(Arc::new(move |snapshot: &Arc<R>| {
            if let Some(inner) = weak.upgrade() {
                inner.schedule(snapshot.clone());
            }
        }));

        if let Err(e) = inner.hydrate().await {
            tracing::warn!(
                "[Replica] Hydration read of {} failed, retrying in background: {}",
                inner.key,
                e
            );
            spawn_hydration_retry(Arc::downgrade(&inner));
        }

        spawn_flush_driver(Arc::downgrade(&inner));
        spawn_listener(Arc::downgrade(&inner), receiver);

        tracing::info!(
            "[Replica] Opened {} as {} at revision {}",
            inner.key,
            inner.gateway.writer(),
            inner.applied_revision.load(Ordering::SeqCst)
        );
        Ok(Self { inner })
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Id stamped on this replica's writes and notifications.
    pub fn replica_id(&self) -> &str {
        self.inner.gateway.writer()
    }

    pub fn now_millis(&self) -> i64 {
        self.inner.gateway.clock().now_millis()
    }

    pub fn snapshot(&self) -> Arc<R> {
        self.inner.container.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<R>> {
        self.inner.container.subscribe()
    }

    /// Runs a local mutation and schedules the result for persistence.
    pub fn apply<T, F>(&self, mutator: F) -> T
    where
        F: FnOnce(&mut R) -> T,
    {
        self.inner.container.apply(mutator)
    }

    pub fn phase(&self) -> SyncPhase {
        *self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Highest remote revision merged into this replica.
    pub fn applied_revision(&self) -> u64 {
        self.inner.applied_revision.load(Ordering::SeqCst)
    }

    /// Enters a long-running local sequence; remote changes wait until it ends.
    pub fn begin_in_flight(&self) {
        self.inner.lock_guard().begin();
    }

    /// Leaves a sequence and runs a deferred reconcile if one is due.
    pub async fn end_in_flight(&self) {
        let due = self.inner.lock_guard().end();
        if due {
            tracing::debug!("[Replica] Running deferred reconcile for {}", self.inner.key);
            if let Err(e) = self.inner.reconcile_now().await {
                tracing::warn!("[Replica] Deferred reconcile of {} failed: {}", self.inner.key, e);
            }
        }
    }

    /// Like [`Replica::end_in_flight`] for callers that cannot await. The
    /// deferred reconcile, if any, runs on a spawned task.
    pub fn end_in_flight_detached(&self) {
        let due = self.inner.lock_guard().end();
        if !due {
            return;
        }
        let inner = self.inner.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = inner.reconcile_now().await {
                        tracing::warn!("[Replica] Deferred reconcile of {} failed: {}", inner.key, e);
                    }
                });
            }
            Err(_) => {
                tracing::warn!("[Replica] No runtime for deferred reconcile of {}", inner.key);
            }
        }
    }

    /// Processes one notification as the listener task would.
    pub async fn handle_notice(&self, message: &SyncMessage) -> Result<bool> {
        self.inner.handle_notice(message).await
    }

    /// Reads the stored envelope and merges it if it is newer than what was
    /// applied. Returns whether the local snapshot changed.
    pub async fn reconcile_now(&self) -> Result<bool> {
        self.inner.reconcile_now().await
    }

    /// Writes any pending change immediately.
    pub async fn flush(&self) -> Result<Option<WriteOutcome>> {
        let pending = self
            .inner
            .coalescer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain();
        let mut last = None;
        for (_, snapshot) in pending {
            last = Some(self.inner.persist(snapshot).await?);
        }
        Ok(last)
    }

    /// Flushes and stops the background tasks.
    pub async fn shutdown(&self) -> Result<()> {
        let flushed = self.flush().await;
        self.inner.cancel.cancel();
        tracing::debug!("[Replica] Shut down {}", self.inner.key);
        flushed.map(|_| ())
    }
}

impl<R: Replicated> ReplicaInner<R> {
    fn lock_guard(&self) -> std::sync::MutexGuard<'_, InFlightGuard> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn schedule(&self, snapshot: Arc<R>) {
        let deadline = Instant::now() + self.debounce;
        self.coalescer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .schedule(self.key.clone(), snapshot, deadline);
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase == SyncPhase::Hydrated {
            *phase = SyncPhase::Dirty;
        }
        drop(phase);
        self.wake.notify_one();
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.coalescer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_deadline()
    }

    /// Loads the stored snapshot. A failed read leaves the replica
    /// unhydrated so the gateway keeps refusing its writes.
    async fn hydrate(&self) -> Result<()> {
        self.set_phase(SyncPhase::Loading);

        let stored = self.gateway.read(&self.key).await?;

        let mut revision = 0;
        let persisted = stored.and_then(|envelope| {
            revision = envelope.revision;
            match self.codec.decode(envelope.snapshot) {
                Ok(persisted) => Some(persisted),
                Err(e) => {
                    tracing::warn!("[Replica] Ignoring undecodable {}: {}", self.key, e);
                    None
                }
            }
        });

        self.container.apply(|state| {
            if let Some(persisted) = persisted {
                state.hydrate(persisted);
            }
            state.mark_hydrated();
        });
        self.applied_revision.fetch_max(revision, Ordering::SeqCst);
        self.set_phase(SyncPhase::Dirty);
        tracing::debug!("[Replica] Hydrated {} at revision {}", self.key, revision);
        Ok(())
    }

    async fn handle_notice(&self, message: &SyncMessage) -> Result<bool> {
        if message.key() != self.key || message.from() == self.gateway.writer() {
            return Ok(false);
        }
        if message.revision() <= self.applied_revision.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.trigger().await
    }

    async fn trigger(&self) -> Result<bool> {
        let admission = self.lock_guard().offer();
        match admission {
            Admission::Apply => self.reconcile_now().await,
            Admission::Deferred => {
                tracing::debug!("[Replica] Deferring reconcile of {} while in flight", self.key);
                Ok(false)
            }
        }
    }

    async fn reconcile_now(&self) -> Result<bool> {
        let _serial = self.reconcile_serial.lock().await;

        if !self.container.snapshot().is_hydrated() {
            self.hydrate().await?;
            return Ok(true);
        }

        let Some(envelope) = self.gateway.read(&self.key).await? else {
            return Ok(false);
        };
        let revision = envelope.revision;
        if revision <= self.applied_revision.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let remote = match self.codec.decode(envelope.snapshot) {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(
                    "[Replica] Ignoring undecodable {} at revision {}: {}",
                    self.key,
                    revision,
                    e
                );
                return Ok(false);
            }
        };

        let changed = self.container.replace_with(|local| {
            let local_persisted = local.persisted();
            if local_persisted == remote {
                return None;
            }
            let merged = local.reconcile(remote.clone());
            if merged.persisted() == local_persisted {
                None
            } else {
                Some(merged)
            }
        });
        self.applied_revision.fetch_max(revision, Ordering::SeqCst);

        tracing::debug!(
            key = %self.key,
            revision,
            changed,
            "[Replica] Reconciled"
        );
        Ok(changed)
    }

    async fn flush_due(&self) {
        let due = self
            .coalescer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take_due(Instant::now());
        for (_, snapshot) in due {
            if let Err(e) = self.persist(snapshot).await {
                tracing::warn!(
                    "[Replica] Persist of {} failed, keeping in-memory state: {}",
                    self.key,
                    e
                );
            }
        }
    }

    async fn persist(&self, snapshot: Arc<R>) -> Result<WriteOutcome> {
        let _serial = self.flush_serial.lock().await;

        let snapshot_value = self.codec.encode(&snapshot.persisted())?;
        let request = PersistRequest {
            snapshot: snapshot_value,
            schema_version: self.codec.schema_version(),
            hydrated: snapshot.is_hydrated(),
        };
        let outcome = self.gateway.write(&self.key, request).await?;

        let idle = self
            .coalescer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty();
        if idle && outcome != WriteOutcome::SkippedNotHydrated {
            self.set_phase(SyncPhase::Hydrated);
        }
        if let WriteOutcome::Persisted { revision } = outcome {
            tracing::debug!("[Replica] {} persisted at revision {}", self.key, revision);
        }
        Ok(outcome)
    }
}

impl<R: Replicated> Drop for ReplicaInner<R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_flush_driver<R: Replicated>(weak: Weak<ReplicaInner<R>>) {
    let Some((wake, cancel)) = weak
        .upgrade()
        .map(|inner| (inner.wake.clone(), inner.cancel.clone()))
    else {
        return;
    };

    tokio::spawn(async move {
        loop {
            let next = match weak.upgrade() {
                Some(inner) => inner.next_deadline(),
                None => break,
            };
            let sleep = async {
                match next {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = wake.notified() => continue,
                _ = sleep => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.flush_due().await;
                }
            }
        }
    });
}

fn spawn_hydration_retry<R: Replicated>(weak: Weak<ReplicaInner<R>>) {
    let Some(cancel) = weak.upgrade().map(|inner| inner.cancel.clone()) else {
        return;
    };
    let backoff = Backoff::new(Duration::from_millis(250), Duration::from_millis(250));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff.delay()) => {}
            }
            let Some(inner) = weak.upgrade() else { break };
            match inner.reconcile_now().await {
                Ok(_) if inner.container.snapshot().is_hydrated() => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("[Replica] Hydration of {} still failing: {}", inner.key, e);
                }
            }
        }
    });
}

fn spawn_listener<R: Replicated>(
    weak: Weak<ReplicaInner<R>>,
    mut receiver: broadcast::Receiver<SyncMessage>,
) {
    let Some(cancel) = weak.upgrade().map(|inner| inner.cancel.clone()) else {
        return;
    };

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = receiver.recv() => received,
            };
            let Some(inner) = weak.upgrade() else { break };
            let result = match received {
                Ok(message) => inner.handle_notice(&message).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "[Replica] Missed {} notices for {}, checking store",
                        skipped,
                        inner.key
                    );
                    inner.trigger().await
                }
                Err(RecvError::Closed) => break,
            };
            if let Err(e) = result {
                tracing::warn!("[Replica] Reconcile of {} failed: {}", inner.key, e);
            }
        }
    });
}
