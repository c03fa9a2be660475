//! Shared identifier aliases used across the pipeline.
//!
//! These are plain `String` aliases rather than newtypes: ids cross process
//! boundaries (destination store, checkpoint rows, run summaries) as strings,
//! and the call sites read better without constant wrapping.

/// Deterministic document identifier, derived from source identity.
///
/// See [`crate::document::document_id`] for the derivation rule.
pub type DocId = String;

/// Name of a configured source (one frontier + one checkpoint per source).
pub type SourceId = String;

/// Monotonic sequence number the driver assigns to frontier units as they are
/// issued. Checkpoints commit in this order.
pub type UnitSeq = u64;
