//! Profile replica.

use crate::bootstrap::ReplicaBuilder;
use crate::replica::Replica;
use chorus_core::error::Result;
use chorus_core::profile::{Profile, ProfileSnapshot};
use chorus_core::sync::WriteOutcome;
use chorus_infrastructure::ProfileCodec;
use std::sync::Arc;
use tokio::sync::watch;

/// Storage key of the profile state.
pub const PROFILE_KEY: &str = "profile";

#[derive(Clone)]
pub struct ProfileReplica {
    replica: Replica<ProfileSnapshot>,
}

impl ProfileReplica {
    pub async fn open(builder: ReplicaBuilder) -> Result<Self> {
        let replica = builder
            .open(Arc::new(ProfileCodec::new()), ProfileSnapshot::default())
            .await?;
        Ok(Self { replica })
    }

    pub fn replica(&self) -> &Replica<ProfileSnapshot> {
        &self.replica
    }

    pub fn snapshot(&self) -> Arc<ProfileSnapshot> {
        self.replica.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ProfileSnapshot>> {
        self.replica.subscribe()
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.replica.snapshot().profiles.clone()
    }

    pub fn current_profile(&self) -> Option<Profile> {
        self.replica.snapshot().current_profile().cloned()
    }

    pub fn create_profile(&self, name: impl Into<String>) -> String {
        let name = name.into();
        self.replica.apply(|s| s.create_profile(name))
    }

    pub fn delete_profile(&self, id: &str) {
        self.replica.apply(|s| s.delete_profile(id));
    }

    pub fn select_profile(&self, id: Option<String>) {
        self.replica.apply(|s| s.select_profile(id));
    }

    pub async fn flush(&self) -> Result<Option<WriteOutcome>> {
        self.replica.flush().await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.replica.shutdown().await
    }
}
