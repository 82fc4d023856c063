use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::error::{FlowError, Result};

const STATE_FILE: &str = "feature-state.json";

/// Durable key/value storage for feature state.
///
/// Calls are synchronous and made while the feature's state is locked, so a
/// backend that touches the disk should prefer the batch methods.
pub trait StateBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    fn write_many(&self, entries: &[(String, String)]) -> Result<()> {
        for (key, value) in entries {
            self.write(key, value)?;
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// In-memory implementation of StateBackend
#[derive(Default, Clone)]
pub struct InMemoryStateBackend {
    entries: Arc<DashMap<String, String>>,
}

impl InMemoryStateBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateBackend for InMemoryStateBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// StateBackend persisted as one JSON document inside a directory.
///
/// Reads are served from memory. Every `write`/`remove` rewrites the whole
/// document through a temporary file and a rename on the calling thread;
/// `write_many`/`remove_many` rewrite it once per batch.
pub struct FileStateBackend {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStateBackend {
    /// Open (or create) the state document in `dir`. A corrupted document is
    /// logged and replaced by an empty one on the next write.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| {
            FlowError::Storage(format!("cannot create {}: {e}", dir.display()))
        })?;
        let path = dir.join(STATE_FILE);

        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "state file is corrupted, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(FlowError::Storage(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| FlowError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| FlowError::Storage(format!("cannot write {}: {e}", self.path.display())))
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StateBackend for FileStateBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn write_many(&self, batch: &[(String, String)]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut entries = self.entries();
        for (key, value) in batch {
            entries.insert(key.clone(), value.clone());
        }
        self.flush(&entries)
    }

    fn remove_many(&self, keys: &[String]) -> Result<()> {
        let mut entries = self.entries();
        let mut removed = false;
        for key in keys {
            removed |= entries.remove(key).is_some();
        }
        if removed {
            self.flush(&entries)?;
        }
        Ok(())
    }
}
