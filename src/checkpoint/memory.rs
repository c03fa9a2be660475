//! Volatile checkpoint storage for tests and development.

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::{Checkpoint, CheckpointError, CheckpointStore};
use crate::types::SourceId;

/// Process-local checkpoint map. Cloning shares the underlying storage, so a
/// test can hold one handle while the driver owns another.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    inner: Arc<Mutex<FxHashMap<SourceId, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current checkpoint for `source` without going through the trait.
    #[must_use]
    pub fn get(&self, source: &str) -> Option<Checkpoint> {
        self.inner.lock().get(source).cloned()
    }

    /// Drop the record for `source`, as an operator clearing state would.
    pub fn clear(&self, source: &str) {
        self.inner.lock().remove(source);
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, source: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.inner.lock().get(source).cloned())
    }

    async fn save(&self, source: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.inner
            .lock()
            .insert(source.to_string(), checkpoint.clone());
        Ok(())
    }
}
