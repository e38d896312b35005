//! One JSON file per key in a shared directory.

use super::atomic_file::AtomicFile;
use async_trait::async_trait;
use chorus_core::error::Result;
use chorus_core::sync::DurableStore;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const EXTENSION: &str = "json";

/// Durable store backed by a directory. Safe to share between processes;
/// every write is atomic.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, key: &str) -> AtomicFile {
        AtomicFile::new(self.dir.join(format!("{}.{}", encode_key(key), EXTENSION)))
    }
}

/// Maps a key to a portable file stem. Characters outside `[A-Za-z0-9._-]`
/// become `%XX`, so distinct keys never share a file.
pub fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[async_trait]
impl DurableStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.file_for(key).load().await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.file_for(key).save(value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.file_for(key).remove().await
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                AtomicFile::new(path).remove().await?;
            }
        }
        tracing::debug!("[FileStore] Cleared {}", self.dir.display());
        Ok(())
    }
}
