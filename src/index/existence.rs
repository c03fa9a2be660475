//! Duplicate prevention via point-existence lookups.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::trace;

use super::{DocumentStore, StoreError};
use crate::types::DocId;

/// Answers "has this document id already been accepted?" before a write.
///
/// Backed by the destination store's point lookup, fronted by a run-local
/// cache of ids this run has already confirmed or indexed, so repeat
/// lookups within one run skip the network.
///
/// The existence check and the subsequent write are deliberately not
/// atomic. A concurrent worker may write an id between this check and our
/// own write; that double-write is benign because store writes are
/// idempotent upserts keyed by id. Correctness rests on upsert semantics,
/// not mutual exclusion.
#[derive(Clone)]
pub struct ExistenceIndex {
    store: Arc<dyn DocumentStore>,
    seen: Arc<Mutex<FxHashSet<DocId>>>,
}

impl ExistenceIndex {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            seen: Arc::new(Mutex::new(FxHashSet::default())),
        }
    }

    /// True when the id is already in the destination store (or was
    /// accepted earlier in this run).
    pub async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        if self.seen.lock().contains(id) {
            trace!(id, "existence cache hit");
            return Ok(true);
        }
        let found = self.store.exists(id).await?;
        if found {
            self.seen.lock().insert(id.to_string());
        }
        Ok(found)
    }

    /// Record ids accepted by the indexer so later units in this run skip
    /// the store lookup.
    pub fn mark_indexed<I>(&self, ids: I)
    where
        I: IntoIterator,
        I::Item: Into<DocId>,
    {
        let mut seen = self.seen.lock();
        for id in ids {
            seen.insert(id.into());
        }
    }

    /// Number of ids the run-local cache currently holds.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.seen.lock().len()
    }
}
