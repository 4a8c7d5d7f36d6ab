//! The `mmpm-env.json` environment file.

use crate::{ConfigAccessor, ConfigError};
use directories::BaseDirs;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// File contents as of a given modification time and length.
struct Snapshot {
    stamp: Option<(SystemTime, u64)>,
    values: Map<String, Value>,
}

/// A JSON object on disk, re-parsed only when the file changes.
pub struct EnvFile {
    path: PathBuf,
    cache: Mutex<Option<Snapshot>>,
}

impl EnvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn stamp(&self) -> Option<(SystemTime, u64)> {
        let metadata = fs::metadata(&self.path).ok()?;
        Some((metadata.modified().ok()?, metadata.len()))
    }

    fn read(&self) -> Map<String, Value> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Map::new();
        };

        if content.trim().is_empty() {
            return Map::new();
        }

        match serde_json::from_str::<Map<String, Value>>(&content) {
            Ok(values) => values,
            Err(e) => {
                warn!("Unable to parse {}: {}. Using defaults", self.path.display(), e);
                Map::new()
            }
        }
    }

    /// Current contents, re-read if the file changed since the last call.
    pub fn values(&self) -> Map<String, Value> {
        let stamp = self.stamp();
        let mut cache = self.cache.lock();

        if let Some(snapshot) = cache.as_ref() {
            if snapshot.stamp.is_some() && snapshot.stamp == stamp {
                return snapshot.values.clone();
            }
        }

        debug!("Reloading {}", self.path.display());
        let values = self.read();
        *cache = Some(Snapshot {
            stamp,
            values: values.clone(),
        });
        values
    }

    /// Look up a single key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values().get(key).cloned()
    }

    /// Replace the whole file.
    pub fn write(&self, values: &Map<String, Value>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, content).map_err(|source| ConfigError::WriteError {
            path: self.path.clone(),
            source,
        })?;
        *self.cache.lock() = None;
        Ok(())
    }
}

/// Accessor for one environment variable.
///
/// `get()` resolves a real process environment variable of the same name
/// first, then the value in the environment file, then the default.
pub struct EnvVar<T> {
    name: &'static str,
    default: Value,
    file: Arc<EnvFile>,
    _type: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned + Default> EnvVar<T> {
    fn new(name: &'static str, defaults: &Map<String, Value>, file: &Arc<EnvFile>) -> Self {
        Self {
            name,
            default: defaults.get(name).cloned().unwrap_or(Value::Null),
            file: Arc::clone(file),
            _type: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self) -> T {
        if let Ok(raw) = std::env::var(self.name) {
            // numbers and booleans parse as JSON, everything else is a string
            let parsed = serde_json::from_str::<T>(&raw)
                .or_else(|_| serde_json::from_value::<T>(Value::String(raw.clone())));

            match parsed {
                Ok(value) => return value,
                Err(_) => warn!("Ignoring invalid value for {}: '{}'", self.name, raw),
            }
        }

        if let Some(value) = self.file.get(self.name) {
            match serde_json::from_value::<T>(value) {
                Ok(value) => return value,
                Err(e) => warn!("Invalid {} in {}: {}", self.name, self.file.path().display(), e),
            }
        }

        serde_json::from_value(self.default.clone()).unwrap_or_default()
    }
}

/// The resolved mmpm environment.
pub struct Environment {
    file: Arc<EnvFile>,
    pub magicmirror_root: EnvVar<PathBuf>,
    pub magicmirror_uri: EnvVar<String>,
    pub pm2_process_name: EnvVar<String>,
    pub docker_compose_file: EnvVar<String>,
    pub is_docker_image: EnvVar<bool>,
    pub log_level: EnvVar<String>,
    pub process_timeout_secs: EnvVar<u64>,
}

impl Environment {
    /// Open the environment file, writing any missing keys with defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let file = Arc::new(EnvFile::new(path));
        let defaults = Self::defaults();

        let mut values = file.values();
        let mut changed = !file.path().exists();

        for (key, value) in &defaults {
            if !values.contains_key(key) {
                values.insert(key.clone(), value.clone());
                changed = true;
            }
        }

        if changed {
            file.write(&values)?;
        }

        Ok(Self {
            magicmirror_root: EnvVar::new("MMPM_MAGICMIRROR_ROOT", &defaults, &file),
            magicmirror_uri: EnvVar::new("MMPM_MAGICMIRROR_URI", &defaults, &file),
            pm2_process_name: EnvVar::new("MMPM_MAGICMIRROR_PM2_PROCESS_NAME", &defaults, &file),
            docker_compose_file: EnvVar::new(
                "MMPM_MAGICMIRROR_DOCKER_COMPOSE_FILE",
                &defaults,
                &file,
            ),
            is_docker_image: EnvVar::new("MMPM_IS_DOCKER_IMAGE", &defaults, &file),
            log_level: EnvVar::new("MMPM_LOG_LEVEL", &defaults, &file),
            process_timeout_secs: EnvVar::new("MMPM_PROCESS_TIMEOUT_SECS", &defaults, &file),
            file,
        })
    }

    fn defaults() -> Map<String, Value> {
        let root = BaseDirs::new()
            .map(|dirs| dirs.home_dir().join("MagicMirror"))
            .unwrap_or_else(|| PathBuf::from("MagicMirror"));

        let mut defaults = Map::new();
        defaults.insert(
            "MMPM_MAGICMIRROR_ROOT".into(),
            Value::from(root.to_string_lossy().into_owned()),
        );
        defaults.insert("MMPM_MAGICMIRROR_URI".into(), Value::from("http://localhost:8080"));
        defaults.insert("MMPM_MAGICMIRROR_PM2_PROCESS_NAME".into(), Value::from(""));
        defaults.insert("MMPM_MAGICMIRROR_DOCKER_COMPOSE_FILE".into(), Value::from(""));
        defaults.insert("MMPM_IS_DOCKER_IMAGE".into(), Value::from(false));
        defaults.insert("MMPM_LOG_LEVEL".into(), Value::from("INFO"));
        defaults.insert("MMPM_PROCESS_TIMEOUT_SECS".into(), Value::from(1800u64));
        defaults
    }

    /// Current file contents, for display.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.file.values()
    }

    pub fn file(&self) -> &EnvFile {
        &self.file
    }
}

impl ConfigAccessor for Environment {
    fn magicmirror_root(&self) -> PathBuf {
        expand_home(self.magicmirror_root.get())
    }

    fn log_level(&self) -> String {
        self.log_level.get()
    }

    fn process_timeout(&self) -> Option<Duration> {
        match self.process_timeout_secs.get() {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn expand_home(path: PathBuf) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path;
    };

    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mmpm-env.json");
        fs::write(&path, r#"{"MMPM_LOG_LEVEL": "DEBUG"}"#).unwrap();

        let env = Environment::open(&path).unwrap();
        let on_disk: Map<String, Value> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(on_disk["MMPM_LOG_LEVEL"], "DEBUG");
        assert!(on_disk.contains_key("MMPM_MAGICMIRROR_ROOT"));
        assert!(!env.is_docker_image.get());
    }

    #[test]
    fn test_corrupt_file_is_rewritten_with_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mmpm-env.json");
        fs::write(&path, "{ not json").unwrap();

        let env = Environment::open(&path).unwrap();
        assert_eq!(env.process_timeout(), Some(Duration::from_secs(1800)));

        let content = fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<Map<String, Value>>(&content).is_ok());
    }

    #[test]
    fn test_get_reflects_file_changes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mmpm-env.json");
        let env = Environment::open(&path).unwrap();

        let mut values = env.snapshot();
        values.insert("MMPM_MAGICMIRROR_ROOT".into(), Value::from("/opt/mm"));
        fs::write(&path, serde_json::to_string(&values).unwrap()).unwrap();
        assert_eq!(env.magicmirror_root(), PathBuf::from("/opt/mm"));

        values.insert("MMPM_MAGICMIRROR_ROOT".into(), Value::from("/srv/mirror-root"));
        fs::write(&path, serde_json::to_string_pretty(&values).unwrap()).unwrap();
        assert_eq!(env.modules_dir(), PathBuf::from("/srv/mirror-root/modules"));
    }

    #[test]
    fn test_zero_timeout_disables_limit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mmpm-env.json");
        let env = Environment::open(&path).unwrap();

        let mut values = env.snapshot();
        values.insert("MMPM_PROCESS_TIMEOUT_SECS".into(), Value::from(0));
        env.file().write(&values).unwrap();

        assert_eq!(env.process_timeout(), None);
    }

    #[test]
    fn test_wrongly_typed_value_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mmpm-env.json");
        fs::write(&path, r#"{"MMPM_IS_DOCKER_IMAGE": "sometimes"}"#).unwrap();

        let env = Environment::open(&path).unwrap();
        assert!(!env.is_docker_image.get());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home(PathBuf::from("/abs/path")), PathBuf::from("/abs/path"));
        let expanded = expand_home(PathBuf::from("~/MagicMirror"));
        assert!(expanded.ends_with("MagicMirror"));
    }
}
