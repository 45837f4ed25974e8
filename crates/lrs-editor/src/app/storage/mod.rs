//! Storage abstraction used by the editor.
//!
//! This module provides a single trait `StorageBackend` and two implementations:
//!
//! - `FileStorage` keeps every key as its own pretty-printed JSON document `<key>.json`
//!   inside the project directory.
//! - `MemoryStorage` keeps the documents in memory; used by the tests.
//!
//! Structured data goes through the free `save_json_backend`/`load_json_backend` helpers so
//! the trait stays object-safe.

use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Storage lock error: {0}")]
    Lock(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Key/value document store
///
/// Keys are plain names without extension; values are UTF-8 JSON documents.
pub trait StorageBackend: Send + Sync {
    /// Store a document for a key.
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Read the document for a key. Returns Ok(None) when the key is missing.
    fn get_string(&self, key: &str) -> StorageResult<Option<String>>;

    /// Remove a key (no-op if the key does not exist).
    fn remove(&self, key: &str) -> StorageResult<()>;
}

pub fn save_json_backend<T: Serialize>(
    backend: &dyn StorageBackend,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    match serde_json::to_string_pretty(value) {
        Ok(s) => backend.set_string(key, &s),
        Err(e) => Err(StorageError::Json(e.to_string())),
    }
}

pub fn load_json_backend<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    key: &str,
) -> StorageResult<Option<T>> {
    match backend.get_string(key)? {
        Some(s) => match serde_json::from_str::<T>(&s) {
            Ok(v) => Ok(Some(v)),
            Err(e) => Err(StorageError::Json(format!("{key}: {e}"))),
        },
        None => Ok(None),
    }
}

/// Read a JSON document from an arbitrary file, e.g. a basesystem export
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let s = fs::read_to_string(path)
        .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&s)
        .map_err(|e| StorageError::Json(format!("{}: {}", path.display(), e)))
}

/// One JSON file per key inside a directory
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open a storage directory, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            StorageError::Io(format!(
                "Failed to create storage directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageBackend for FileStorage {
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path(key);
        // Written next to the target, then renamed over it
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| StorageError::Io(format!("write failed: {}", e)))?;
        fs::rename(&tmp, &path).map_err(|e| StorageError::Io(format!("rename failed: {}", e)))?;
        tracing::debug!(path = %path.display(), bytes = value.len(), "document saved");
        Ok(())
    }

    fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| StorageError::Io(format!("remove failed: {}", e)))?;
        }
        Ok(())
    }
}

/// In-memory storage
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn set_string(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Lock(format!("mutex poisoned: {:?}", e)))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
        let guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Lock(format!("mutex poisoned: {:?}", e)))?;
        Ok(guard.get(key).cloned())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Lock(format!("mutex poisoned: {:?}", e)))?;
        guard.remove(key);
        Ok(())
    }
}
