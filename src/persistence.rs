//! Grid state persistence
//!
//! The full `symbol -> GridState` document is rewritten after every mutating
//! operation, so a restart recovers exactly where the last cycle left off.
//! External readers (dashboards, the `status` CLI) treat the file as an
//! eventually-consistent snapshot and must never write to it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::core::types::GridState;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read state: {0}")]
    Read(String),

    #[error("Failed to write state: {0}")]
    Write(String),

    #[error("Failed to decode state: {0}")]
    Decode(String),

    #[error("Failed to encode state: {0}")]
    Encode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable home for the `symbol -> GridState` mapping.
///
/// The trait is the seam for swapping the JSON file for an embedded KV
/// store without touching `GridOrderManager`, and for injecting an
/// in-memory store in tests.
pub trait StateStore: Send + Sync {
    fn load(&self) -> StoreResult<HashMap<String, GridState>>;

    /// Replace the entire persisted document.
    fn save(&self, grids: &HashMap<String, GridState>) -> StoreResult<()>;
}

/// JSON file store with full-document rewrite on every save.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store at `path`, creating the parent directory if needed.
    pub fn new<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::Write(e.to_string()))?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> StoreResult<HashMap<String, GridState>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| StoreError::Read(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn save(&self, grids: &HashMap<String, GridState>) -> StoreResult<()> {
        let content =
            serde_json::to_string_pretty(grids).map_err(|e| StoreError::Encode(e.to_string()))?;
        fs::write(&self.path, content).map_err(|e| StoreError::Write(e.to_string()))
    }
}

/// In-memory store for tests and ephemeral runs.
///
/// Clones share the same underlying document, so a "restarted" manager built
/// from a clone sees exactly what the previous one saved.
#[derive(Clone, Default)]
pub struct MemoryStore {
    grids: Arc<Mutex<HashMap<String, GridState>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> StoreResult<HashMap<String, GridState>> {
        Ok(self.grids.lock().unwrap().clone())
    }

    fn save(&self, grids: &HashMap<String, GridState>) -> StoreResult<()> {
        *self.grids.lock().unwrap() = grids.clone();
        Ok(())
    }
}
