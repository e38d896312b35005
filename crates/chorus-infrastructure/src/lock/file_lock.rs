//! Cross-process lock on a file, via `fs2`.

use crate::storage::file_store::encode_key;
use async_trait::async_trait;
use chorus_core::error::{ChorusError, Result};
use chorus_core::sync::{LockLease, PersistLock};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;

/// Exclusive OS file lock on `<dir>/<name>.lock`.
///
/// The lock is per open file handle, so it also serializes replicas that
/// live in the same process. Lock files are left in place; removing them
/// while another process waits on the handle would split the lock.
#[derive(Debug, Clone)]
pub struct FileLock {
    dir: PathBuf,
}

impl FileLock {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", encode_key(name)))
    }
}

struct FileLease {
    file: File,
    path: PathBuf,
}

#[async_trait]
impl LockLease for FileLease {
    async fn release(self: Box<Self>) -> Result<()> {
        FileExt::unlock(&self.file).map_err(|e| {
            ChorusError::lock(format!("Failed to unlock {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl PersistLock for FileLock {
    async fn acquire(&self, name: &str) -> Result<Box<dyn LockLease>> {
        let path = self.lock_path(name);
        let dir = self.dir.clone();

        let lease = tokio::task::spawn_blocking(move || -> Result<FileLease> {
            fs::create_dir_all(&dir)?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive().map_err(|e| {
                ChorusError::lock(format!("Failed to acquire {}: {}", path.display(), e))
            })?;
            Ok(FileLease { file, path })
        })
        .await
        .map_err(|e| ChorusError::internal(format!("Lock task failed: {}", e)))??;

        tracing::trace!("[FileLock] Acquired {}", name);
        Ok(Box::new(lease))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_acquire_waits_for_release() {
        let temp_dir = TempDir::new().unwrap();
        let lock = FileLock::new(temp_dir.path());
        let first = lock.acquire("chat:persist").await.unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let flag = acquired.clone();
        let other = FileLock::new(temp_dir.path());
        let waiter = tokio::spawn(async move {
            let lease = other.acquire("chat:persist").await.unwrap();
            flag.store(true, Ordering::SeqCst);
            lease.release().await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!acquired.load(Ordering::SeqCst));

        first.release().await.unwrap();
        waiter.await.unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_names_map_to_separate_files() {
        let temp_dir = TempDir::new().unwrap();
        let lock = FileLock::new(temp_dir.path());
        let a = lock.acquire("chat:persist").await.unwrap();
        let b = lock.acquire("profile:persist").await.unwrap();
        a.release().await.unwrap();
        b.release().await.unwrap();
        assert!(temp_dir.path().join("chat%3Apersist.lock").exists());
    }
}
