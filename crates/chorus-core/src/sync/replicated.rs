//! What the sync engine needs to know about a replicated state type.

use crate::error::Result;

/// A snapshot type that can be persisted, hydrated and merged.
///
/// The engine is generic over this trait; chat sessions and profiles both
/// implement it.
pub trait Replicated: Clone + Send + Sync + 'static {
    /// Projection that is stored and compared. Excludes ephemeral fields.
    type Persisted: Clone + PartialEq + Send + Sync + 'static;

    fn persisted(&self) -> Self::Persisted;

    fn is_hydrated(&self) -> bool;

    fn mark_hydrated(&mut self);

    /// Folds the stored projection into a freshly booted snapshot.
    fn hydrate(&mut self, persisted: Self::Persisted) {
        *self = self.reconcile(persisted);
    }

    /// Merges a remote projection into this snapshot. Must be total.
    fn reconcile(&self, remote: Self::Persisted) -> Self;
}

/// Converts a persisted projection to and from its stored JSON.
pub trait SnapshotCodec<P>: Send + Sync {
    /// Written to `Envelope::schema_version`.
    fn schema_version(&self) -> u32;

    fn encode(&self, value: &P) -> Result<serde_json::Value>;

    /// Decodes, migrating older layouts if needed.
    fn decode(&self, value: serde_json::Value) -> Result<P>;
}
