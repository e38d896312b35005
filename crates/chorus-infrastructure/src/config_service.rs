//! Loads and saves `chorus.toml`.

use crate::paths::ChorusPaths;
use crate::storage::AtomicFile;
use chorus_core::config::ChorusConfig;
use chorus_core::error::Result;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `storage.data_dir`.
pub const DATA_DIR_ENV: &str = "CHORUS_DATA_DIR";

#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
}

impl ConfigService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Service for the platform config file.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(ChorusPaths::config_file()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file, falling back to defaults when it is missing, then
    /// applies environment overrides.
    pub async fn load(&self) -> Result<ChorusConfig> {
        let config = self.load_file().await?;
        Ok(apply_data_dir_override(
            config,
            std::env::var(DATA_DIR_ENV).ok(),
        ))
    }

    /// Reads the file only, without environment overrides.
    pub async fn load_file(&self) -> Result<ChorusConfig> {
        match AtomicFile::new(&self.path).load().await? {
            Some(content) => {
                let config: ChorusConfig = toml::from_str(&content)?;
                tracing::debug!("[ConfigService] Loaded {}", self.path.display());
                Ok(config)
            }
            None => {
                tracing::debug!(
                    "[ConfigService] No config at {}, using defaults",
                    self.path.display()
                );
                Ok(ChorusConfig::default())
            }
        }
    }

    pub async fn save(&self, config: &ChorusConfig) -> Result<()> {
        let content = toml::to_string_pretty(config)?;
        AtomicFile::new(&self.path).save(&content).await
    }

    /// Writes a default file unless one exists. Returns whether it wrote.
    pub async fn init(&self) -> Result<bool> {
        if AtomicFile::new(&self.path).load().await?.is_some() {
            return Ok(false);
        }
        self.save(&ChorusConfig::default()).await?;
        tracing::info!("[ConfigService] Wrote default config: {}", self.path.display());
        Ok(true)
    }
}

/// Applies a `CHORUS_DATA_DIR` value. Empty values are ignored.
pub fn apply_data_dir_override(mut config: ChorusConfig, value: Option<String>) -> ChorusConfig {
    if let Some(dir) = value.filter(|v| !v.trim().is_empty()) {
        config.storage.data_dir = Some(PathBuf::from(dir));
    }
    config
}
