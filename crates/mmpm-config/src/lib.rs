//! Configuration for mmpm.
//!
//! Resolves where the data files live and exposes the user's environment file
//! through per-variable accessors that re-read the file whenever it changes,
//! so edits take effect without restarting the CLI or the API server.

mod env;
mod paths;

pub use env::{EnvFile, EnvVar, Environment};
pub use paths::DataPaths;

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine a configuration directory")]
    NoConfigDir,
    #[error("Failed to create {path}: {source}")]
    CreateError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize environment: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Read access to resolved configuration values.
///
/// Implementations must resolve values on every call rather than caching
/// them at startup.
pub trait ConfigAccessor: Send + Sync {
    /// Root directory of the MagicMirror installation.
    fn magicmirror_root(&self) -> PathBuf;

    /// Directory packages are installed into.
    fn modules_dir(&self) -> PathBuf {
        self.magicmirror_root().join("modules")
    }

    /// Configured log level name (e.g. `INFO`).
    fn log_level(&self) -> String;

    /// Upper bound for a single external command, `None` for no limit.
    fn process_timeout(&self) -> Option<Duration>;
}

/// Fixed configuration values.
#[derive(Debug, Clone)]
pub struct StaticConfig {
    pub magicmirror_root: PathBuf,
    pub log_level: String,
    pub process_timeout: Option<Duration>,
}

impl StaticConfig {
    pub fn new(magicmirror_root: impl Into<PathBuf>) -> Self {
        Self {
            magicmirror_root: magicmirror_root.into(),
            log_level: "INFO".to_string(),
            process_timeout: None,
        }
    }
}

impl ConfigAccessor for StaticConfig {
    fn magicmirror_root(&self) -> PathBuf {
        self.magicmirror_root.clone()
    }

    fn log_level(&self) -> String {
        self.log_level.clone()
    }

    fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout
    }
}
