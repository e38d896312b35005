//! Application layer: running replicas on top of the sync engine.
//!
//! [`bootstrap::SyncContext`] turns a [`chorus_core::config::ChorusConfig`]
//! into concrete adapters; [`chat::ChatReplica`] and
//! [`profile::ProfileReplica`] are the handles presentation code talks to.

pub mod bootstrap;
pub mod chat;
pub mod profile;
pub mod replica;

pub use bootstrap::{ReplicaBuilder, SyncContext};
pub use chat::{CHAT_KEY, ChatReplica, ResponseStream};
pub use profile::{PROFILE_KEY, ProfileReplica};
pub use replica::{Replica, ReplicaParts};
