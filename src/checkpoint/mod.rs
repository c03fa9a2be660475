/*!
Checkpoints: the durable high-water mark of a source sweep.

A [`Checkpoint`] records the last frontier cursor whose work unit was fully
drained (every item indexed or confirmed duplicate). The driver writes it only
after durable indexing succeeds, which is the crash-safety contract of the
whole pipeline: resuming from a checkpoint can repeat work but never skip it.

One checkpoint per source, overwritten monotonically, never rolled back.

Backends implement [`CheckpointStore`]:
- [`InMemoryCheckpointStore`] for tests and single-process development,
- [`JsonFileCheckpointStore`] for a local durable record with atomic overwrite,
- `SqliteCheckpointStore` (feature `sqlite`, default) for shared durable state.

Serialization goes through a persisted mirror shape ([`PersistedCheckpoint`])
with RFC3339 timestamps, keeping `chrono` types out of the stored form.
*/

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::JsonFileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frontier::FrontierCursor;

/// Last fully-completed frontier position for one source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub cursor: FrontierCursor,
    pub completed_at: DateTime<Utc>,
}

impl Checkpoint {
    #[must_use]
    pub fn new(cursor: FrontierCursor, completed_at: DateTime<Utc>) -> Self {
        Self {
            cursor,
            completed_at,
        }
    }
}

/// Serde-friendly stored form of a [`Checkpoint`].
///
/// The cursor serializes through its own tagged form; the timestamp is kept
/// as an RFC3339 string so the stored shape has no chrono types.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCheckpoint {
    pub cursor: FrontierCursor,
    pub completed_at: String,
}

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            cursor: cp.cursor.clone(),
            completed_at: cp.completed_at.to_rfc3339(),
        }
    }
}

impl TryFrom<PersistedCheckpoint> for Checkpoint {
    type Error = CheckpointError;

    fn try_from(p: PersistedCheckpoint) -> Result<Self, CheckpointError> {
        let completed_at = DateTime::parse_from_rfc3339(&p.completed_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CheckpointError::Corrupt {
                detail: format!("bad completed_at {:?}: {e}", p.completed_at),
            })?;
        Ok(Checkpoint {
            cursor: p.cursor,
            completed_at,
        })
    }
}

/// Pluggable persistence for checkpoints.
///
/// `save` must be an atomic overwrite: a crash mid-write leaves either the old
/// record or the new one, never a torn mix. A failed save is run-fatal for the
/// driver, so implementations should not silently swallow backend errors.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Latest checkpoint for `source`, or `None` if the source has never
    /// completed a unit.
    async fn load(&self, source: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Overwrite the checkpoint for `source`.
    async fn save(&self, source: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
}

/// Failures of checkpoint persistence.
///
/// All of these are run-fatal when raised during `save`: continuing without a
/// durable resume point would cause silent re-processing or skips on the next
/// run.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed for {path}: {source}")]
    #[diagnostic(
        code(tideline::checkpoint::io),
        help("Check that the checkpoint directory exists and is writable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint (de)serialization failed: {source}")]
    #[diagnostic(code(tideline::checkpoint::serde))]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    #[error("stored checkpoint is corrupt: {detail}")]
    #[diagnostic(
        code(tideline::checkpoint::corrupt),
        help("Delete the stored record to restart the source from its origin.")
    )]
    Corrupt { detail: String },

    #[error("checkpoint backend error: {message}")]
    #[diagnostic(
        code(tideline::checkpoint::backend),
        help("Ensure the database URL is valid and the schema is reachable.")
    )]
    Backend { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_round_trip() {
        let cp = Checkpoint::new(FrontierCursor::offset(400), Utc::now());
        let persisted = PersistedCheckpoint::from(&cp);
        let back = Checkpoint::try_from(persisted).unwrap();
        assert_eq!(back.cursor, cp.cursor);
        assert_eq!(back.completed_at, cp.completed_at);
    }

    #[test]
    fn bad_timestamp_is_corrupt_not_fabricated() {
        let persisted = PersistedCheckpoint {
            cursor: FrontierCursor::month(2021, 2),
            completed_at: "yesterdayish".into(),
        };
        let err = Checkpoint::try_from(persisted).unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }
}
