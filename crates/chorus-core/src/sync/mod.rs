//! Replica synchronization engine.
//!
//! Flow per key: a container mutation schedules a coalesced write; the
//! gateway takes the persist lock, compares, stamps a revision and notifies;
//! siblings reconcile the new revision into their own container.

pub mod clock;
pub mod coalescer;
pub mod container;
pub mod envelope;
pub mod gateway;
pub mod guard;
pub mod ports;
pub mod reconcile;
pub mod replicated;
pub mod retry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coalescer::WriteCoalescer;
pub use container::{ChangeListener, ReplicaContainer};
pub use envelope::{Envelope, PingRecord, SyncMessage};
pub use gateway::{PersistRequest, PersistenceGateway, WriteOutcome, persist_lock_name};
pub use guard::{Admission, InFlightGuard};
pub use ports::{ChangeNotifier, DurableStore, LockLease, PersistLock};
pub use reconcile::{merge_messages, merge_session, merge_sessions, reconcile_chat};
pub use replicated::{Replicated, SnapshotCodec};
pub use retry::{Backoff, retry_with_jitter};

/// Replica-local view of one storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    Loading,
    /// Hydrated, no local change waiting to be written.
    Hydrated,
    /// A local change is scheduled but not yet written.
    Dirty,
}
