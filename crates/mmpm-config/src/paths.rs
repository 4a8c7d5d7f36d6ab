//! Locations of the files mmpm keeps between runs.

use crate::ConfigError;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

/// Overrides the data directory (containers, tests).
const CONFIG_DIR_VAR: &str = "MMPM_CONFIG_DIR";

/// The mmpm data directory and the files inside it.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Open the default data directory, creating it if needed.
    pub fn open() -> Result<Self, ConfigError> {
        Self::open_at(Self::default_dir()?)
    }

    /// Open a data directory at a specific location.
    pub fn open_at(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let paths = Self { root: root.into() };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    /// `$MMPM_CONFIG_DIR`, or the platform config dir (`~/.config/mmpm`).
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_VAR).filter(|d| !d.is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        ProjectDirs::from("dev", "mmpm", "mmpm")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or(ConfigError::NoConfigDir)
    }

    fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [self.root.clone(), self.log_dir()] {
            fs::create_dir_all(&dir).map_err(|source| ConfigError::CreateError {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn env_file(&self) -> PathBuf {
        self.root.join("mmpm-env.json")
    }

    /// Scraped catalog cache.
    pub fn catalog_file(&self) -> PathBuf {
        self.root.join("MagicMirror-3rd-party-packages-db.json")
    }

    /// `{last-update, expiration}` metadata for the catalog cache.
    pub fn expiration_file(&self) -> PathBuf {
        self.root.join("MagicMirror-3rd-party-packages-db-expiration.json")
    }

    pub fn external_packages_file(&self) -> PathBuf {
        self.root.join("mmpm-external-packages.json")
    }

    /// Upgrade ledger.
    pub fn upgrades_file(&self) -> PathBuf {
        self.root.join("mmpm-available-upgrades.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_at_creates_directories() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("nested").join("mmpm");
        let paths = DataPaths::open_at(&root).unwrap();

        assert!(root.is_dir());
        assert!(paths.log_dir().is_dir());
        assert_eq!(paths.upgrades_file(), root.join("mmpm-available-upgrades.json"));
    }
}
