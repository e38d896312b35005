//! Primary store with a transparent secondary fallback.

use async_trait::async_trait;
use chorus_core::error::{ChorusError, Result};
use chorus_core::sync::DurableStore;
use std::sync::Arc;

/// Reads and writes go to the primary tier; the secondary tier takes over
/// when the primary fails. A write fails only when both tiers fail. A read
/// whose primary failed is answered by the secondary only when it holds a
/// value, since an empty secondary cannot tell "absent" from "unreadable".
pub struct TieredStore {
    primary: Arc<dyn DurableStore>,
    secondary: Arc<dyn DurableStore>,
}

impl TieredStore {
    pub fn new(primary: Arc<dyn DurableStore>, secondary: Arc<dyn DurableStore>) -> Self {
        Self { primary, secondary }
    }
}

fn both_failed(op: &str, key: &str, primary: ChorusError, secondary: ChorusError) -> ChorusError {
    ChorusError::storage(format!(
        "{} '{}' failed on both tiers (primary: {}; secondary: {})",
        op, key, primary, secondary
    ))
}

#[async_trait]
impl DurableStore for TieredStore {
    /// A primary miss also consults the secondary, which may hold a value
    /// written while the primary was failing.
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let primary_err = match self.primary.get(key).await {
            Ok(Some(value)) => return Ok(Some(value)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("[TieredStore] Primary read failed for {}: {}", key, e);
                Some(e)
            }
        };

        match (self.secondary.get(key).await, primary_err) {
            (Ok(Some(value)), _) => Ok(Some(value)),
            (Ok(None), None) => Ok(None),
            (Ok(None), Some(primary)) => Err(primary),
            (Err(e), None) => {
                tracing::warn!("[TieredStore] Secondary read failed for {}: {}", key, e);
                Ok(None)
            }
            (Err(secondary), Some(primary)) => Err(both_failed("get", key, primary, secondary)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let primary = match self.primary.set(key, value).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        tracing::warn!(
            "[TieredStore] Primary write failed for {}, using secondary: {}",
            key,
            primary
        );
        self.secondary
            .set(key, value)
            .await
            .map_err(|secondary| both_failed("set", key, primary, secondary))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let primary = self.primary.remove(key).await;
        let secondary = self.secondary.remove(key).await;
        match (primary, secondary) {
            (Err(p), Err(s)) => Err(both_failed("remove", key, p, s)),
            _ => Ok(()),
        }
    }

    async fn clear(&self) -> Result<()> {
        let primary = self.primary.clear().await;
        let secondary = self.secondary.clear().await;
        match (primary, secondary) {
            (Err(p), Err(s)) => Err(both_failed("clear", "*", p, s)),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    struct BrokenStore;

    #[async_trait]
    impl DurableStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(ChorusError::io("disk gone"))
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(ChorusError::io("disk gone"))
        }
        async fn remove(&self, _key: &str) -> Result<()> {
            Err(ChorusError::io("disk gone"))
        }
        async fn clear(&self) -> Result<()> {
            Err(ChorusError::io("disk gone"))
        }
    }

    #[tokio::test]
    async fn test_primary_serves_when_healthy() {
        let primary = MemoryStore::new();
        let secondary = MemoryStore::new();
        let store = TieredStore::new(Arc::new(primary.clone()), Arc::new(secondary.clone()));

        store.set("k", "v").await.unwrap();
        assert_eq!(primary.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(secondary.is_empty());
    }

    #[tokio::test]
    async fn test_falls_back_when_primary_fails() {
        let secondary = MemoryStore::new();
        let store = TieredStore::new(Arc::new(BrokenStore), Arc::new(secondary.clone()));

        store.set("k", "v").await.unwrap();
        assert_eq!(secondary.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.remove("k").await.unwrap();
        assert!(secondary.is_empty());
    }

    #[tokio::test]
    async fn test_primary_miss_reads_secondary() {
        let secondary = MemoryStore::new();
        secondary.set("k", "old").await.unwrap();
        let store = TieredStore::new(Arc::new(MemoryStore::new()), Arc::new(secondary));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_failed_primary_with_empty_secondary_is_error() {
        let store = TieredStore::new(Arc::new(BrokenStore), Arc::new(MemoryStore::new()));
        assert!(store.get("k").await.is_err());
    }

    #[tokio::test]
    async fn test_both_tiers_failing_is_storage_error() {
        let store = TieredStore::new(Arc::new(BrokenStore), Arc::new(BrokenStore));
        assert!(matches!(
            store.set("k", "v").await,
            Err(ChorusError::Storage(_))
        ));
        assert!(matches!(store.get("k").await, Err(ChorusError::Storage(_))));
    }
}
