use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::ResourceFailure;
use crate::error::Result;
use crate::paginate::PaginationState;

/// Snapshot of a long-running batch, written every few resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Number of top-level resources already handled.
    pub processed_count: usize,
    pub total_count: usize,
    pub timestamp: DateTime<Utc>,
    pub snapshot: PaginationState,
    /// Resources that failed before this checkpoint.
    #[serde(default)]
    pub failures: Vec<ResourceFailure>,
}

impl Checkpoint {
    pub fn new(processed_count: usize, total_count: usize, snapshot: PaginationState) -> Self {
        Self {
            processed_count,
            total_count,
            timestamp: Utc::now(),
            snapshot,
            failures: Vec::new(),
        }
    }

    pub fn with_failures(mut self, failures: Vec<ResourceFailure>) -> Self {
        self.failures = failures;
        self
    }

    pub fn is_finished(&self) -> bool {
        self.processed_count >= self.total_count
    }
}

/// Durable storage for checkpoints, keyed by resource.
///
/// `save` replaces any previous checkpoint for the key as a whole.
pub trait CheckpointStore {
    fn save(&self, key: &str, checkpoint: &Checkpoint) -> Result<()>;

    fn load(&self, key: &str) -> Result<Option<Checkpoint>>;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    fn list(&self) -> Result<Vec<(String, Checkpoint)>>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for &S {
    fn save(&self, key: &str, checkpoint: &Checkpoint) -> Result<()> {
        (**self).save(key, checkpoint)
    }

    fn load(&self, key: &str) -> Result<Option<Checkpoint>> {
        (**self).load(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }

    fn list(&self) -> Result<Vec<(String, Checkpoint)>> {
        (**self).list()
    }
}

/// In-memory store that also counts calls, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    checkpoints: BTreeMap<String, Checkpoint>,
    saves: usize,
    deletes: usize,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far.
    pub fn saves(&self) -> usize {
        self.lock().saves
    }

    /// Number of `delete` calls so far.
    pub fn deletes(&self) -> usize {
        self.lock().deletes
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, key: &str, checkpoint: &Checkpoint) -> Result<()> {
        let mut state = self.lock();
        state.saves += 1;
        state.checkpoints.insert(key.to_string(), checkpoint.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Checkpoint>> {
        Ok(self.lock().checkpoints.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.lock();
        state.deletes += 1;
        state.checkpoints.remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<(String, Checkpoint)>> {
        Ok(self
            .lock()
            .checkpoints
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
