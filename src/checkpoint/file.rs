//! JSON-file checkpoint storage with atomic overwrite.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

use super::{Checkpoint, CheckpointError, CheckpointStore, PersistedCheckpoint};

/// One JSON file per source under a base directory.
///
/// Writes go to a sibling `.tmp` file first and are renamed into place, so a
/// crash mid-save leaves either the previous checkpoint or the new one, never
/// a torn record.
#[derive(Clone, Debug)]
pub struct JsonFileCheckpointStore {
    dir: PathBuf,
}

impl JsonFileCheckpointStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the record for `source`.
    #[must_use]
    pub fn path_for(&self, source: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(source)))
    }
}

/// Keep source names filesystem-safe; they come from configuration, not from
/// fetched content, so this only guards against separators and the like.
fn sanitize(source: &str) -> String {
    source
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn io_err(path: &Path, source: std::io::Error) -> CheckpointError {
    CheckpointError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl CheckpointStore for JsonFileCheckpointStore {
    #[instrument(skip(self), err)]
    async fn load(&self, source: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(source);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path, e)),
        };
        let persisted: PersistedCheckpoint = serde_json::from_str(&raw)?;
        Ok(Some(Checkpoint::try_from(persisted)?))
    }

    #[instrument(skip(self, checkpoint), err)]
    async fn save(&self, source: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err(&self.dir, e))?;

        let path = self.path_for(source);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(&PersistedCheckpoint::from(checkpoint))?;

        fs::write(&tmp, body).await.map_err(|e| io_err(&tmp, e))?;
        // Same-directory rename makes the overwrite atomic.
        fs::rename(&tmp, &path).await.map_err(|e| io_err(&path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontier::FrontierCursor;
    use chrono::Utc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let store = JsonFileCheckpointStore::new(dir.path());
        let cp = Checkpoint::new(FrontierCursor::month(2020, 12), Utc::now());

        store.save("mailing-list", &cp).await.unwrap();
        let loaded = store.load("mailing-list").await.unwrap().unwrap();
        assert_eq!(loaded.cursor, cp.cursor);
    }

    #[tokio::test]
    async fn missing_file_is_a_fresh_source() {
        let dir = tempdir().unwrap();
        let store = JsonFileCheckpointStore::new(dir.path());
        assert!(store.load("never-run").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let store = JsonFileCheckpointStore::new(dir.path());
        let cp = Checkpoint::new(FrontierCursor::offset(40), Utc::now());
        store.save("forum", &cp).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["forum.json".to_string()]);
    }

    #[tokio::test]
    async fn corrupt_record_is_reported_not_ignored() {
        let dir = tempdir().unwrap();
        let store = JsonFileCheckpointStore::new(dir.path());
        std::fs::write(store.path_for("forum"), b"{not json").unwrap();

        let err = store.load("forum").await.unwrap_err();
        assert!(matches!(err, CheckpointError::Serde { .. }));
    }

    #[test]
    fn sanitize_keeps_names_flat() {
        assert_eq!(sanitize("mailing-list"), "mailing-list");
        assert_eq!(sanitize("../escape"), "___escape");
    }
}
