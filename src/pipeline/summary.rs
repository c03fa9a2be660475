//! Final report of one pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::IndexFailure;

use super::CounterSnapshot;

/// What a run accomplished, returned by the driver and emitted as the final
/// run event.
///
/// Per-document failures are listed with their detail so an operator can
/// decide whether to re-run; re-running is always safe because indexing is
/// an idempotent upsert keyed by document id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The run was stopped by cancellation before the frontier finished.
    pub cancelled: bool,
    pub units_visited: u64,
    pub units_fetched: u64,
    /// Units skipped after a fatal fetch or extraction failure.
    pub units_failed_fatal: u64,
    pub docs_extracted: u64,
    /// Documents dropped because their id already existed.
    pub docs_deduped: u64,
    pub docs_indexed: u64,
    pub docs_created: u64,
    pub docs_updated: u64,
    pub docs_failed: u64,
    /// Failed document ids with error detail, in the order they failed.
    pub failures: Vec<IndexFailure>,
}

impl RunSummary {
    pub(crate) fn assemble(
        run_id: String,
        source: String,
        started_at: DateTime<Utc>,
        cancelled: bool,
        counters: CounterSnapshot,
        failures: Vec<IndexFailure>,
    ) -> Self {
        Self {
            run_id,
            source,
            started_at,
            finished_at: Utc::now(),
            cancelled,
            units_visited: counters.units_visited,
            units_fetched: counters.units_fetched,
            units_failed_fatal: counters.units_failed_fatal,
            docs_extracted: counters.docs_extracted,
            docs_deduped: counters.docs_deduped,
            docs_indexed: counters.docs_indexed,
            docs_created: counters.docs_created,
            docs_updated: counters.docs_updated,
            docs_failed: counters.docs_failed,
            failures,
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.units_failed_fatal == 0 && self.failures.is_empty()
    }

    /// One-line rendering for logs and the final run event.
    #[must_use]
    pub fn headline(&self) -> String {
        format!(
            "{}: {} units ({} skipped), {} extracted, {} duplicate, {} indexed ({} new, {} updated), {} failed",
            self.source,
            self.units_visited,
            self.units_failed_fatal,
            self.docs_extracted,
            self.docs_deduped,
            self.docs_indexed,
            self.docs_created,
            self.docs_updated,
            self.docs_failed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ErrorDetail;

    fn summary(failures: Vec<IndexFailure>) -> RunSummary {
        let counters = CounterSnapshot {
            units_visited: 4,
            units_fetched: 4,
            units_failed_fatal: 0,
            docs_extracted: 100,
            docs_deduped: 20,
            docs_indexed: 79,
            docs_created: 70,
            docs_updated: 9,
            docs_failed: failures.len() as u64,
        };
        RunSummary::assemble(
            "run-1".into(),
            "forum".into(),
            Utc::now(),
            false,
            counters,
            failures,
        )
    }

    #[test]
    fn clean_run_has_no_failures() {
        assert!(summary(Vec::new()).is_clean());
    }

    #[test]
    fn failures_make_the_run_dirty() {
        let s = summary(vec![IndexFailure {
            doc_id: "forum-9".into(),
            detail: ErrorDetail::permanent(Some(400), "mapping error"),
        }]);
        assert!(!s.is_clean());
        assert_eq!(s.failures[0].doc_id, "forum-9");
    }

    #[test]
    fn headline_reports_the_splits() {
        let line = summary(Vec::new()).headline();
        assert!(line.contains("100 extracted"));
        assert!(line.contains("20 duplicate"));
        assert!(line.contains("79 indexed (70 new, 9 updated)"));
    }

    #[test]
    fn summary_serializes_for_operators() {
        let json = serde_json::to_string(&summary(Vec::new())).unwrap();
        assert!(json.contains("\"docs_indexed\":79"));
        assert!(json.contains("\"cancelled\":false"));
    }
}
