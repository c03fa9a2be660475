/*! Destination-store access and batched, idempotent indexing.

The destination store is any keyed-upsert service reachable over the
[`DocumentStore`] trait: bulk upsert of `(id, Document)` pairs with
per-item results, point existence lookup by id, and an optional refresh
making writes visible to subsequent lookups.

Writes are upserts keyed by document id. Submitting an id that already
exists overwrites the prior record entirely (last-write-wins, no merge);
duplicate prevention is the concern of [`ExistenceIndex`], not of the
store rejecting conflicts. That choice is what makes crash-resume safe:
re-indexing an already-indexed document is a no-op overwrite.

[`BatchIndexer`] drives submission in batches, retries only transient
failures, and reports exactly which ids failed and why.
*/

pub mod batcher;
pub mod existence;
pub mod http;
pub mod memory;

pub use batcher::{BatchIndexer, BatchResult, IndexError, ThroughputTracker};
pub use existence::ExistenceIndex;
pub use http::HttpDocumentStore;
pub use memory::InMemoryDocumentStore;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::Document;
use crate::types::DocId;

/// Why one document's upsert failed.
///
/// `retryable` mirrors the destination's signal: rate limiting (HTTP 429)
/// and server faults can be retried, mapping/validation errors cannot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub status: Option<u16>,
    pub reason: String,
    pub retryable: bool,
}

impl ErrorDetail {
    /// Detail for a permanent per-document failure.
    #[must_use]
    pub fn permanent(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            retryable: false,
        }
    }

    /// Detail for a failure worth retrying.
    #[must_use]
    pub fn transient(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            retryable: true,
        }
    }
}

/// One failed document id with its error detail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFailure {
    pub doc_id: DocId,
    pub detail: ErrorDetail,
}

/// How an accepted upsert landed in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertStatus {
    Created,
    Updated,
}

/// Per-document result of a bulk upsert, in submission order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Accepted { id: DocId, status: UpsertStatus },
    Failed { id: DocId, detail: ErrorDetail },
}

impl UpsertOutcome {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            UpsertOutcome::Accepted { id, .. } | UpsertOutcome::Failed { id, .. } => id,
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, UpsertOutcome::Accepted { .. })
    }
}

/// Whole-call failures against the destination store.
///
/// Per-document problems travel inside [`UpsertOutcome::Failed`]; a
/// `StoreError` means the call itself did not complete.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    /// The request never completed or the store answered with a retryable
    /// status (5xx, 429).
    #[error("store transport failure{}: {reason}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    #[diagnostic(
        code(tideline::index::transport),
        help("The destination store may be briefly unavailable; the call is retried with backoff.")
    )]
    Transport { status: Option<u16>, reason: String },

    /// The store rejected the request outright (auth failure, bad request).
    #[error("store rejected request (HTTP {status}): {reason}")]
    #[diagnostic(
        code(tideline::index::rejected),
        help("Check destination credentials and endpoint configuration.")
    )]
    Rejected { status: u16, reason: String },

    #[error("store payload could not be encoded or decoded")]
    #[diagnostic(code(tideline::index::serde))]
    Serde(#[from] serde_json::Error),

    /// Store client could not be constructed; a configuration fault.
    #[error("store client configuration: {reason}")]
    #[diagnostic(code(tideline::index::config))]
    Config { reason: String },
}

impl StoreError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transport { .. })
    }
}

/// Keyed-upsert destination store.
///
/// Implementations must treat `bulk_upsert` as idempotent per id and
/// return one [`UpsertOutcome`] per submitted document, in order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn bulk_upsert(&self, documents: &[Document]) -> Result<Vec<UpsertOutcome>, StoreError>;

    /// Point lookup: has a document with this id been accepted?
    async fn exists(&self, id: &str) -> Result<bool, StoreError>;

    /// Make prior writes visible to subsequent `exists` calls. Advisory;
    /// stores with immediate visibility may no-op.
    async fn refresh(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_id_covers_both_variants() {
        let accepted = UpsertOutcome::Accepted {
            id: "a".into(),
            status: UpsertStatus::Created,
        };
        let failed = UpsertOutcome::Failed {
            id: "b".into(),
            detail: ErrorDetail::permanent(Some(400), "mapping error"),
        };
        assert_eq!(accepted.id(), "a");
        assert_eq!(failed.id(), "b");
        assert!(accepted.is_accepted());
        assert!(!failed.is_accepted());
    }

    #[test]
    fn transport_errors_are_transient() {
        let transport = StoreError::Transport {
            status: Some(503),
            reason: "unavailable".into(),
        };
        let rejected = StoreError::Rejected {
            status: 401,
            reason: "bad credentials".into(),
        };
        assert!(transport.is_transient());
        assert!(!rejected.is_transient());
    }

    #[test]
    fn error_detail_serializes_for_summaries() {
        let detail = ErrorDetail::transient(Some(429), "throttled");
        let json = serde_json::to_string(&detail).unwrap();
        assert!(json.contains("\"retryable\":true"));
        assert!(json.contains("429"));
    }
}
