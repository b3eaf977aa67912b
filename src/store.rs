use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const CHANGE_CAPACITY: usize = 64;

/// One key change, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// A stored value with the version it was written at. Versions start at 1
/// and grow by one per write of that key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned {
    pub version: u64,
    pub value: Value,
}

/// String-keyed JSON store with change notification and optimistic
/// concurrency.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Versioned>>;

    /// Write `value` only if the key is still at `expected` (`None` meaning
    /// absent). Returns the new version, or [`Error::Conflict`].
    fn compare_and_swap(&self, key: &str, expected: Option<u64>, value: Value) -> Result<u64>;

    /// Unconditional write. Returns the new version.
    fn set(&self, key: &str, value: Value) -> Result<u64>;

    fn remove(&self, key: &str) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Typed helpers over any [`Store`].
pub trait StoreExt: Store {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<(T, u64)>> {
        match self.get(key)? {
            Some(entry) => Ok(Some((serde_json::from_value(entry.value)?, entry.version))),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<u64> {
        self.set(key, serde_json::to_value(value)?)
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

/// In-memory store, optionally mirrored to a JSON file after every write.
pub struct JsonStore {
    entries: Mutex<IndexMap<String, Versioned>>,
    changes: broadcast::Sender<StoreChange>,
    path: Option<PathBuf>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self::with_entries(IndexMap::new(), None)
    }

    /// Open (or start) a file-backed store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                IndexMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            IndexMap::new()
        };
        debug!(path = %path.display(), keys = entries.len(), "opened store");
        Ok(Self::with_entries(entries, Some(path)))
    }

    fn with_entries(entries: IndexMap<String, Versioned>, path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            entries: Mutex::new(entries),
            changes,
            path,
        }
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Versioned>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply one write under the lock, persist, then notify. The in-memory
    /// map only changes once the file write has succeeded.
    fn write(
        &self,
        key: &str,
        expected: Option<Option<u64>>,
        value: Option<Value>,
    ) -> Result<u64> {
        let mut entries = self.lock();
        let current = entries.get(key).map(|e| e.version);
        if let Some(expected) = expected {
            if current != expected {
                return Err(Error::Conflict {
                    key: key.to_string(),
                    expected,
                });
            }
        }

        let version = current.unwrap_or(0) + 1;
        let mut next = entries.clone();
        let old_value = match &value {
            Some(v) => next
                .insert(
                    key.to_string(),
                    Versioned {
                        version,
                        value: v.clone(),
                    },
                )
                .map(|e| e.value),
            None => next.shift_remove(key).map(|e| e.value),
        };

        if let Some(path) = &self.path {
            if let Err(e) = persist(path, &next) {
                warn!(
                    key,
                    path = %path.display(),
                    error = %e,
                    "store write failed, keeping previous state"
                );
                return Err(e);
            }
        }
        *entries = next;
        drop(entries);

        // No subscribers is fine.
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            old_value,
            new_value: value,
        });
        Ok(version)
    }
}

fn persist(path: &Path, entries: &IndexMap<String, Versioned>) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl Store for JsonStore {
    fn get(&self, key: &str) -> Result<Option<Versioned>> {
        Ok(self.lock().get(key).cloned())
    }

    fn compare_and_swap(&self, key: &str, expected: Option<u64>, value: Value) -> Result<u64> {
        self.write(key, Some(expected), Some(value))
    }

    fn set(&self, key: &str, value: Value) -> Result<u64> {
        self.write(key, None, Some(value))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.write(key, None, None).map(|_| ())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
