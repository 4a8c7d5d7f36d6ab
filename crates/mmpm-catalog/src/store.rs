//! Whole-file JSON reads and atomic whole-file JSON writes.

use crate::CatalogError;
use fs4::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

/// Contents of a JSON state file.
pub(crate) enum Stored<T> {
    /// Missing or empty.
    Absent,
    /// Present but not valid for `T`.
    Corrupt,
    Present(T),
}

/// Whether `path` exists and is non-empty.
pub(crate) fn has_content(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

pub(crate) fn read<T: DeserializeOwned>(path: &Path) -> Stored<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return Stored::Absent,
    };

    if content.trim().is_empty() {
        return Stored::Absent;
    }

    match serde_json::from_str(&content) {
        Ok(value) => Stored::Present(value),
        Err(e) => {
            warn!("{} has an invalid layout: {}", path.display(), e);
            Stored::Corrupt
        }
    }
}

/// Replace the whole file atomically.
///
/// The new content goes to a temporary file beside `path` which is then
/// renamed over it, so readers see either the old or the new content. Writers
/// are serialized on a `.lock` file next to `path`.
pub(crate) fn write<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CatalogError> {
    let io_err = |source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    };

    let content = serde_json::to_string_pretty(value)?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_err)?;

    let lock = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path(path))
        .map_err(io_err)?;
    lock.lock_exclusive().map_err(io_err)?;

    let result = NamedTempFile::new_in(parent)
        .and_then(|mut file| {
            file.write_all(content.as_bytes())?;
            file.as_file().sync_all()?;
            Ok(file)
        })
        .and_then(|file| file.persist(path).map(|_| ()).map_err(|e| e.error));

    let _ = lock.unlock();
    result.map_err(io_err)
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}
