//! Crash-safe whole-file writes.
//!
//! A write goes to a uniquely named temp file in the target directory, is
//! fsynced, then renamed over the target. Readers see the old or the new
//! content, never a torn file.

use chorus_core::error::{ChorusError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub struct AtomicFile {
    path: PathBuf,
}

impl AtomicFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` when the file is missing or blank.
    pub async fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(None),
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChorusError::io(format!(
                "Failed to read '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }

    pub async fn save(&self, content: &str) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            ChorusError::io(format!("Path has no parent: {}", self.path.display()))
        })?;
        fs::create_dir_all(parent).await?;

        let tmp_path = self.temp_path(parent)?;
        let mut tmp_file = fs::File::create(&tmp_path).await?;
        tmp_file.write_all(content.as_bytes()).await?;
        tmp_file.sync_all().await?;
        drop(tmp_file);

        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Deleting a missing file is not an error.
    pub async fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // Unique per write: several processes may write the same key at once.
    fn temp_path(&self, parent: &Path) -> Result<PathBuf> {
        let file_name = self.path.file_name().ok_or_else(|| {
            ChorusError::io(format!("Path has no file name: {}", self.path.display()))
        })?;
        Ok(parent.join(format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            uuid::Uuid::new_v4().simple()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicFile::new(temp_dir.path().join("nested").join("a.json"));

        file.save("{\"a\":1}").await.unwrap();
        assert_eq!(file.load().await.unwrap().as_deref(), Some("{\"a\":1}"));

        file.save("{\"a\":2}").await.unwrap();
        assert_eq!(file.load().await.unwrap().as_deref(), Some("{\"a\":2}"));
    }

    #[tokio::test]
    async fn test_missing_and_blank_files_are_none() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicFile::new(temp_dir.path().join("missing.json"));
        assert!(file.load().await.unwrap().is_none());

        file.save("  \n").await.unwrap();
        assert!(file.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicFile::new(temp_dir.path().join("a.json"));
        file.save("x").await.unwrap();
        file.remove().await.unwrap();
        file.remove().await.unwrap();

        let leftovers = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
