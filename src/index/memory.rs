//! In-memory destination store for tests and demos.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{DocumentStore, ErrorDetail, StoreError, UpsertOutcome, UpsertStatus};
use crate::document::Document;
use crate::types::DocId;

#[derive(Debug)]
struct FailureScript {
    detail: ErrorDetail,
    /// `None` fails forever; `Some(n)` fails the next n submissions.
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct Inner {
    docs: FxHashMap<DocId, Document>,
    write_counts: FxHashMap<DocId, usize>,
    failures: FxHashMap<DocId, FailureScript>,
    transport_failures: u32,
    refreshes: usize,
}

/// Keyed-upsert store held entirely in memory, with scriptable failures.
///
/// Cloning shares the backing storage, so a test can keep one handle for
/// assertions while the pipeline owns another. Failure scripts let tests
/// exercise the partial-failure and retry paths without a network:
/// per-document scripts produce [`UpsertOutcome::Failed`] entries, and
/// transport scripts fail whole `bulk_upsert` calls.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every future submission of `id` with `detail`.
    pub fn fail_document(&self, id: impl Into<DocId>, detail: ErrorDetail) {
        self.inner.lock().failures.insert(
            id.into(),
            FailureScript {
                detail,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` submissions of `id`, then accept it.
    pub fn fail_document_times(&self, id: impl Into<DocId>, detail: ErrorDetail, times: u32) {
        self.inner.lock().failures.insert(
            id.into(),
            FailureScript {
                detail,
                remaining: Some(times.max(1)),
            },
        );
    }

    /// Fail the next `times` whole `bulk_upsert` calls with HTTP 503.
    pub fn fail_transport_calls(&self, times: u32) {
        self.inner.lock().transport_failures = times;
    }

    #[must_use]
    pub fn document(&self, id: &str) -> Option<Document> {
        self.inner.lock().docs.get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().docs.is_empty()
    }

    /// How many times `id` has been written (idempotence assertions).
    #[must_use]
    pub fn write_count(&self, id: &str) -> usize {
        self.inner.lock().write_counts.get(id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.inner.lock().refreshes
    }

    /// All stored ids, sorted for stable assertions.
    #[must_use]
    pub fn ids(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self.inner.lock().docs.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn bulk_upsert(&self, documents: &[Document]) -> Result<Vec<UpsertOutcome>, StoreError> {
        let mut inner = self.inner.lock();

        if inner.transport_failures > 0 {
            inner.transport_failures -= 1;
            return Err(StoreError::Transport {
                status: Some(503),
                reason: "scripted outage".to_string(),
            });
        }

        let mut outcomes = Vec::with_capacity(documents.len());
        for doc in documents {
            let scripted = match inner.failures.get_mut(&doc.id) {
                Some(script) => {
                    let detail = script.detail.clone();
                    let exhausted = match &mut script.remaining {
                        Some(n) => {
                            *n -= 1;
                            *n == 0
                        }
                        None => false,
                    };
                    if exhausted {
                        inner.failures.remove(&doc.id);
                    }
                    Some(detail)
                }
                None => None,
            };

            if let Some(detail) = scripted {
                outcomes.push(UpsertOutcome::Failed {
                    id: doc.id.clone(),
                    detail,
                });
                continue;
            }

            *inner.write_counts.entry(doc.id.clone()).or_default() += 1;
            let status = if inner.docs.insert(doc.id.clone(), doc.clone()).is_some() {
                UpsertStatus::Updated
            } else {
                UpsertStatus::Created
            };
            outcomes.push(UpsertOutcome::Accepted {
                id: doc.id.clone(),
                status,
            });
        }
        Ok(outcomes)
    }

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().docs.contains_key(id))
    }

    async fn refresh(&self) -> Result<(), StoreError> {
        self.inner.lock().refreshes += 1;
        Ok(())
    }
}
