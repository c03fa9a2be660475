//! Run-scoped state passed through every pipeline stage.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::control::CancelToken;
use crate::event_bus::{EventEmitter, NullEmitter};
use crate::index::ExistenceIndex;

use super::IngestSettings;

/// Explicit run state handed to each stage: settings, the existence index,
/// the progress emitter, cancellation, and run-scoped counters. Replaces the
/// process-wide singletons and shared URL sets the per-site scrapers grew.
///
/// Cloning is cheap; all clones observe the same run.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub settings: Arc<IngestSettings>,
    pub existence: ExistenceIndex,
    pub emitter: Arc<dyn EventEmitter>,
    pub cancel: CancelToken,
    pub counters: Arc<RunCounters>,
}

impl RunContext {
    #[must_use]
    pub fn new(
        settings: Arc<IngestSettings>,
        existence: ExistenceIndex,
        emitter: Arc<dyn EventEmitter>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            settings,
            existence,
            emitter,
            cancel,
            counters: Arc::new(RunCounters::default()),
        }
    }

    /// Context with a null emitter and no cancellation, for tests and small
    /// embedded uses.
    #[must_use]
    pub fn detached(settings: Arc<IngestSettings>, existence: ExistenceIndex) -> Self {
        Self::new(
            settings,
            existence,
            Arc::new(NullEmitter),
            CancelToken::never(),
        )
    }
}

/// Monotonic counters shared by all concurrent units of one run.
///
/// Purely observational: nothing in control flow reads them. Relaxed ordering
/// is enough because each counter stands alone.
#[derive(Debug, Default)]
pub struct RunCounters {
    units_visited: AtomicU64,
    units_fetched: AtomicU64,
    units_failed_fatal: AtomicU64,
    docs_extracted: AtomicU64,
    docs_deduped: AtomicU64,
    docs_indexed: AtomicU64,
    docs_created: AtomicU64,
    docs_updated: AtomicU64,
    docs_failed: AtomicU64,
}

impl RunCounters {
    pub fn unit_visited(&self) {
        self.units_visited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unit_fetched(&self) {
        self.units_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unit_failed_fatal(&self) {
        self.units_failed_fatal.fetch_add(1, Ordering::Relaxed);
    }

    pub fn extracted(&self, n: u64) {
        self.docs_extracted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn deduped(&self, n: u64) {
        self.docs_deduped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn indexed(&self, accepted: u64, created: u64, updated: u64) {
        self.docs_indexed.fetch_add(accepted, Ordering::Relaxed);
        self.docs_created.fetch_add(created, Ordering::Relaxed);
        self.docs_updated.fetch_add(updated, Ordering::Relaxed);
    }

    pub fn failed(&self, n: u64) {
        self.docs_failed.fetch_add(n, Ordering::Relaxed);
    }

    /// Point-in-time copy for summaries and progress lines.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            units_visited: self.units_visited.load(Ordering::Relaxed),
            units_fetched: self.units_fetched.load(Ordering::Relaxed),
            units_failed_fatal: self.units_failed_fatal.load(Ordering::Relaxed),
            docs_extracted: self.docs_extracted.load(Ordering::Relaxed),
            docs_deduped: self.docs_deduped.load(Ordering::Relaxed),
            docs_indexed: self.docs_indexed.load(Ordering::Relaxed),
            docs_created: self.docs_created.load(Ordering::Relaxed),
            docs_updated: self.docs_updated.load(Ordering::Relaxed),
            docs_failed: self.docs_failed.load(Ordering::Relaxed),
        }
    }
}

/// Plain-number view of [`RunCounters`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub units_visited: u64,
    pub units_fetched: u64,
    pub units_failed_fatal: u64,
    pub docs_extracted: u64,
    pub docs_deduped: u64,
    pub docs_indexed: u64,
    pub docs_created: u64,
    pub docs_updated: u64,
    pub docs_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryDocumentStore;

    fn context() -> RunContext {
        let settings = Arc::new(IngestSettings::new("src", "https://index.example"));
        let existence = ExistenceIndex::new(Arc::new(InMemoryDocumentStore::new()));
        RunContext::detached(settings, existence)
    }

    #[test]
    fn clones_share_counters() {
        let ctx = context();
        let clone = ctx.clone();
        ctx.counters.extracted(3);
        clone.counters.extracted(2);
        assert_eq!(ctx.counters.snapshot().docs_extracted, 5);
    }

    #[test]
    fn indexed_splits_created_and_updated() {
        let ctx = context();
        ctx.counters.indexed(5, 2, 3);
        let snap = ctx.counters.snapshot();
        assert_eq!(snap.docs_indexed, 5);
        assert_eq!(snap.docs_created, 2);
        assert_eq!(snap.docs_updated, 3);
    }

    #[test]
    fn run_ids_are_unique_per_context() {
        assert_ne!(context().run_id, context().run_id);
    }
}
