//! Storage of the previous node pid.
//!
//! The pid of every spawned node is recorded under a per-network key so that
//! a node orphaned by a crash of the supervising application can be found
//! and killed on the next start.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// File name of the JSON store inside the state directory.
pub const STATE_FILE_NAME: &str = "launcher-state.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read state file at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write state file at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt state file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Key/value storage of process ids.
#[async_trait]
pub trait PidStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<u32>, StoreError>;

    /// Store `pid` under `key`, or remove the key when `pid` is `None`.
    async fn store(&self, key: &str, pid: Option<u32>) -> Result<(), StoreError>;
}

/// Pid store persisted as a flat JSON object.
///
/// ```json
/// { "mainnet-PREVIOUS-CARDANO-PID": 4242 }
/// ```
pub struct JsonFilePidStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFilePidStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Store located in `state_dir`.
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(STATE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, u32>, StoreError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    async fn write_all(&self, values: &BTreeMap<String, u32>) -> Result<(), StoreError> {
        let write_error = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }

        let content = serde_json::to_vec_pretty(values).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;

        // Replace atomically: temp file, then rename.
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(write_error)?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(write_error)
    }
}

#[async_trait]
impl PidStore for JsonFilePidStore {
    async fn load(&self, key: &str) -> Result<Option<u32>, StoreError> {
        Ok(self.read_all().await?.get(key).copied())
    }

    async fn store(&self, key: &str, pid: Option<u32>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.read_all().await?;
        match pid {
            Some(pid) => values.insert(key.to_string(), pid),
            None => values.remove(key),
        };
        self.write_all(&values).await
    }
}

/// In-memory pid store.
#[derive(Default)]
pub struct MemoryPidStore {
    values: Mutex<HashMap<String, u32>>,
}

impl MemoryPidStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PidStore for MemoryPidStore {
    async fn load(&self, key: &str) -> Result<Option<u32>, StoreError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).copied())
    }

    async fn store(&self, key: &str, pid: Option<u32>) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        match pid {
            Some(pid) => values.insert(key.to_string(), pid),
            None => values.remove(key),
        };
        Ok(())
    }
}
