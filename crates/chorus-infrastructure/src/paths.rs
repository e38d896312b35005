//! Path resolution for Chorus files.
//!
//! Platform directories come from `version_migrate::AppPaths`.
//!
//! ```text
//! ~/.config/chorus/            # Config directory
//! ├── chorus.toml              # Configuration
//! └── logs/                    # Rolling log files
//!
//! ~/.local/share/chorus/       # Data directory (or storage.data_dir)
//! ├── store/                   # One JSON file per storage key
//! ├── locks/                   # Lock files for the persist cycle
//! └── fallback/                # Secondary tier (when configured here)
//! ```

use chorus_core::config::ChorusConfig;
use chorus_core::error::{ChorusError, Result};
use std::path::{Path, PathBuf};
use version_migrate::AppPaths;

pub const CONFIG_FILE_NAME: &str = "chorus.toml";

pub struct ChorusPaths;

impl ChorusPaths {
    fn app_paths() -> AppPaths {
        AppPaths::new("chorus")
    }

    pub fn config_dir() -> Result<PathBuf> {
        Self::app_paths()
            .config_dir()
            .map_err(|_| ChorusError::config("Cannot resolve config directory"))
    }

    pub fn default_data_dir() -> Result<PathBuf> {
        Self::app_paths()
            .data_dir()
            .map_err(|_| ChorusError::config("Cannot resolve data directory"))
    }

    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    pub fn log_dir() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("logs"))
    }

    /// Data directory from config, or the platform default.
    pub fn data_dir(config: &ChorusConfig) -> Result<PathBuf> {
        match &config.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_data_dir(),
        }
    }

    pub fn store_dir(data_dir: &Path) -> PathBuf {
        data_dir.join("store")
    }

    pub fn lock_dir(data_dir: &Path) -> PathBuf {
        data_dir.join("locks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_data_dir_wins() {
        let mut config = ChorusConfig::default();
        config.storage.data_dir = Some(PathBuf::from("/tmp/chorus-test"));
        assert_eq!(
            ChorusPaths::data_dir(&config).unwrap(),
            PathBuf::from("/tmp/chorus-test")
        );
        assert_eq!(
            ChorusPaths::store_dir(Path::new("/d")),
            PathBuf::from("/d/store")
        );
    }
}
