//! Key/value storage adapters holding JSON-encoded blobs.
//!
//! Every adapter publishes a [`StorageChange`] after each successful write so
//! other holders of the same keys can refresh their caches.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::{Error, Result};

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Notification that `key` now holds `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub value: Option<String>,
}

/// Persistent string storage used by the configuration and module stores.
pub trait Storage: Send + Sync {
    /// Read the raw value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// In-process storage backed by a hash map.
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StorageChange>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            map: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Seed a value without emitting a change, as if written by an earlier run.
    pub fn seed(&self, key: &str, value: &str) {
        self.map.lock().insert(key.to_string(), value.to_string());
    }

    /// Simulate a write by another instance: store and notify.
    pub fn external_write(&self, key: &str, value: &str) {
        self.seed(key, value);
        let _sent = self.changes.send(StorageChange {
            key: key.to_string(),
            value: Some(value.to_string()),
        });
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map.lock().insert(key.to_string(), value.to_string());
        trace!(key, bytes = value.len(), "memory_storage_set");
        // No receivers is not an error.
        let _sent = self.changes.send(StorageChange {
            key: key.to_string(),
            value: Some(value.to_string()),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

/// Storage that keeps one `<key>.json` file per key inside a directory.
pub struct FileStorage {
    dir: PathBuf,
    changes: broadcast::Sender<StorageChange>,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| Error::Storage {
            key: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            dir: dir.to_path_buf(),
            changes,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(s) => Some(s),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "file_storage_read_failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let to_err = |e: io::Error| Error::Storage {
            key: key.to_string(),
            message: e.to_string(),
        };
        fs::write(&tmp, value).map_err(to_err)?;
        fs::rename(&tmp, &path).map_err(to_err)?;
        trace!(key, path = %path.display(), "file_storage_set");
        let _sent = self.changes.send(StorageChange {
            key: key.to_string(),
            value: Some(value.to_string()),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}
