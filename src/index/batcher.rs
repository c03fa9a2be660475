/*! Batched submission with partial-failure isolation.

Documents are submitted in batches of up to `batch_size` (default 50).
A batch is a best-effort group, never a transaction: per-item outcomes
are split into accepted ids and failures, permanent failures are
reported and dropped, and only the transient subset is retried, with
the same capped backoff discipline the fetcher uses.

Each document is stamped with `indexed_at` at submission time if the
extractor left it unset, and the store is refreshed after each batch so
accepted writes are visible to the next unit's existence checks.

Throughput accounting (elapsed so far / documents done, extrapolated
over the remainder) feeds operator progress events only; nothing in the
control flow reads it.
*/

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::{DocumentStore, ErrorDetail, IndexFailure, StoreError, UpsertOutcome, UpsertStatus};
use crate::control::CancelToken;
use crate::document::Document;
use crate::event_bus::{Event, EventEmitter, NullEmitter};
use crate::fetch::BackoffPolicy;
use crate::types::DocId;

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Aggregated outcome of one [`BatchIndexer::submit`] call.
#[derive(Clone, Debug, Default)]
pub struct BatchResult {
    /// Ids durably accepted by the store.
    pub accepted: FxHashSet<DocId>,
    /// How many accepted writes created a new record.
    pub created: usize,
    /// How many accepted writes overwrote an existing record.
    pub updated: usize,
    /// Failed ids with their error detail, in submission order.
    pub failed: Vec<IndexFailure>,
}

impl BatchResult {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    #[must_use]
    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.doc_id.as_str()).collect()
    }

    fn absorb(&mut self, other: BatchResult) {
        self.accepted.extend(other.accepted);
        self.created += other.created;
        self.updated += other.updated;
        self.failed.extend(other.failed);
    }
}

/// Failures that abort a submission outright. Per-document problems are
/// reported inside [`BatchResult::failed`] instead.
#[derive(Debug, Error, Diagnostic)]
pub enum IndexError {
    #[error("destination store unavailable after {attempts} attempts")]
    #[diagnostic(
        code(tideline::index::unavailable),
        help("The store kept failing whole bulk calls; the run stops rather than spin.")
    )]
    Unavailable {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(StoreError),

    #[error("indexing cancelled")]
    #[diagnostic(code(tideline::index::cancelled))]
    Cancelled,
}

/// Advisory elapsed/remaining arithmetic behind progress events.
#[derive(Clone, Debug)]
pub struct ThroughputTracker {
    total: usize,
    done: usize,
    elapsed: Duration,
}

impl ThroughputTracker {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn record(&mut self, completed: usize, took: Duration) {
        self.done += completed;
        self.elapsed += took;
    }

    #[must_use]
    pub fn done(&self) -> usize {
        self.done
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Estimated time remaining: elapsed per completed document, scaled by
    /// what is left. `None` until at least one document has completed.
    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        if self.done == 0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.done);
        Some(self.elapsed.mul_f64(remaining as f64 / self.done as f64))
    }

    #[must_use]
    pub fn eta_secs(&self) -> Option<f64> {
        self.eta().map(|d| d.as_secs_f64())
    }
}

/// Groups documents into batches and drives idempotent bulk upserts.
#[derive(Clone)]
pub struct BatchIndexer {
    store: Arc<dyn DocumentStore>,
    batch_size: usize,
    policy: BackoffPolicy,
    max_attempts: u32,
    refresh_after_batch: bool,
    emitter: Arc<dyn EventEmitter>,
}

impl BatchIndexer {
    #[must_use]
    pub fn builder(store: Arc<dyn DocumentStore>) -> BatchIndexerBuilder {
        BatchIndexerBuilder {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            policy: BackoffPolicy::default(),
            max_attempts: 5,
            refresh_after_batch: true,
            emitter: Arc::new(NullEmitter),
        }
    }

    /// Submit documents in batches, retrying transient failures.
    ///
    /// Invalid documents (empty id or body) are reported as failed without
    /// ever reaching the store. The call returns an error only for
    /// store-level faults (unavailable after retries, rejected request) or
    /// cancellation; per-document failures land in the result.
    #[instrument(skip_all, fields(total = documents.len()), err)]
    pub async fn submit(
        &self,
        documents: Vec<Document>,
        cancel: &CancelToken,
    ) -> Result<BatchResult, IndexError> {
        let mut result = BatchResult::default();
        if documents.is_empty() {
            return Ok(result);
        }

        let mut valid = Vec::with_capacity(documents.len());
        for doc in documents {
            match doc.validate() {
                Ok(()) => valid.push(doc),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "rejecting invalid document before submission");
                    result.failed.push(IndexFailure {
                        doc_id: doc.id,
                        detail: ErrorDetail::permanent(None, e.to_string()),
                    });
                }
            }
        }

        let mut tracker = ThroughputTracker::new(valid.len());
        let mut start = 0;
        while start < valid.len() {
            let end = (start + self.batch_size).min(valid.len());
            let chunk = stamp_indexed_at(&valid[start..end]);
            debug!(from = start, to = end, "indexing batch");

            let chunk_started = Instant::now();
            let chunk_result = self.submit_chunk(chunk, cancel).await?;
            tracker.record(end - start, chunk_started.elapsed());
            result.absorb(chunk_result);

            if self.refresh_after_batch {
                if let Err(e) = self.store.refresh().await {
                    warn!(error = %e, "store refresh failed, continuing");
                }
            }

            // Progress is advisory; a dropped bus must not fail the batch.
            let _ = self.emitter.emit(Event::batch_progress(
                tracker.done(),
                tracker.total(),
                result.failed.len(),
                tracker.eta_secs(),
            ));
            start = end;
        }
        Ok(result)
    }

    async fn submit_chunk(
        &self,
        mut pending: Vec<Document>,
        cancel: &CancelToken,
    ) -> Result<BatchResult, IndexError> {
        let mut result = BatchResult::default();
        let mut call_failures: u32 = 0;
        let mut item_rounds: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }

            let outcomes = match self.store.bulk_upsert(&pending).await {
                Ok(outcomes) => outcomes,
                Err(e) if e.is_transient() => {
                    call_failures += 1;
                    if call_failures >= self.max_attempts {
                        return Err(IndexError::Unavailable {
                            attempts: call_failures,
                            source: e,
                        });
                    }
                    self.pause(call_failures, cancel).await?;
                    continue;
                }
                Err(e) => return Err(IndexError::Store(e)),
            };

            let give_up = item_rounds + 1 >= self.max_attempts;
            let submitted = std::mem::take(&mut pending);
            for (doc, outcome) in submitted.into_iter().zip(outcomes) {
                match outcome {
                    UpsertOutcome::Accepted { id, status } => {
                        match status {
                            UpsertStatus::Created => result.created += 1,
                            UpsertStatus::Updated => result.updated += 1,
                        }
                        result.accepted.insert(id);
                    }
                    UpsertOutcome::Failed { id, detail } if detail.retryable && !give_up => {
                        debug!(%id, status = ?detail.status, "transient item failure, will retry");
                        pending.push(doc);
                    }
                    UpsertOutcome::Failed { id, detail } => {
                        if detail.retryable {
                            warn!(%id, "retry budget exhausted for document");
                        }
                        result.failed.push(IndexFailure { doc_id: id, detail });
                    }
                }
            }

            if pending.is_empty() {
                return Ok(result);
            }
            item_rounds += 1;
            self.pause(item_rounds, cancel).await?;
        }
    }

    async fn pause(&self, failures: u32, cancel: &CancelToken) -> Result<(), IndexError> {
        let delay = self.policy.delay_for(failures);
        debug!(
            delay_ms = delay.as_millis() as u64,
            "backing off before store retry"
        );
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            () = cancel.cancelled() => Err(IndexError::Cancelled),
        }
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Clone for submission, stamping `indexed_at` where the extractor left
/// it unset. One timestamp per batch keeps upload order strict.
fn stamp_indexed_at(docs: &[Document]) -> Vec<Document> {
    let now = Utc::now();
    docs.iter()
        .map(|d| {
            if d.indexed_at.is_some() {
                d.clone()
            } else {
                let mut stamped = d.clone();
                stamped.indexed_at = Some(now);
                stamped
            }
        })
        .collect()
}

/// Builder for [`BatchIndexer`].
pub struct BatchIndexerBuilder {
    store: Arc<dyn DocumentStore>,
    batch_size: usize,
    policy: BackoffPolicy,
    max_attempts: u32,
    refresh_after_batch: bool,
    emitter: Arc<dyn EventEmitter>,
}

impl BatchIndexerBuilder {
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cap on submissions of any one batch or document, counting the first.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn refresh_after_batch(mut self, refresh: bool) -> Self {
        self.refresh_after_batch = refresh;
        self
    }

    /// Progress events are sent here; defaults to a null emitter.
    #[must_use]
    pub fn emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    #[must_use]
    pub fn build(self) -> BatchIndexer {
        BatchIndexer {
            store: self.store,
            batch_size: self.batch_size,
            policy: self.policy,
            max_attempts: self.max_attempts,
            refresh_after_batch: self.refresh_after_batch,
            emitter: self.emitter,
        }
    }
}
