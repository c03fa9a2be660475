#![allow(dead_code)]

//! Shared fixtures for the integration tests: a line-per-item extractor,
//! fast backoff settings, and checkpoint store doubles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use tideline::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use tideline::document::{BodyType, Document, document_id};
use tideline::extract::{ExtractError, Extractor, from_fn};
use tideline::fetch::RawContent;
use tideline::frontier::FrontierCursor;
use tideline::pipeline::IngestSettings;

/// One document per non-empty line of the fetched body, with deterministic
/// ids. Stands in for a site-specific extractor.
pub fn line_extractor(site: &'static str) -> impl Extractor {
    from_fn(move |content: &RawContent, _cursor: &FrontierCursor| {
        content
            .body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                Document::builder()
                    .id(document_id(site, line.trim()))
                    .body(line.trim().to_string(), BodyType::Raw)
                    .url(content.url.as_str())
                    .domain(site)
                    .build()
                    .map_err(|e| ExtractError::Malformed {
                        reason: e.to_string(),
                    })
            })
            .collect()
    })
}

/// Settings tuned for tests: millisecond backoff, three attempts.
pub fn fast_settings(source: &str, base_url: &str) -> IngestSettings {
    IngestSettings::new(source, base_url)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
        .with_max_retries(3)
        .with_request_timeout(Duration::from_secs(5))
}

/// Body payload with one item line per id.
pub fn page_body(ids: &[&str]) -> String {
    ids.join("\n")
}

/// Checkpoint store that records every save in order, on top of working
/// in-memory persistence. Lets tests assert commit ordering.
#[derive(Clone, Default)]
pub struct RecordingCheckpointStore {
    latest: Arc<Mutex<Option<Checkpoint>>>,
    saves: Arc<Mutex<Vec<FrontierCursor>>>,
}

impl RecordingCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saves(&self) -> Vec<FrontierCursor> {
        self.saves.lock().clone()
    }

    pub fn latest(&self) -> Option<Checkpoint> {
        self.latest.lock().clone()
    }
}

#[async_trait]
impl CheckpointStore for RecordingCheckpointStore {
    async fn load(&self, _source: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.latest.lock().clone())
    }

    async fn save(&self, _source: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.saves.lock().push(checkpoint.cursor.clone());
        *self.latest.lock() = Some(checkpoint.clone());
        Ok(())
    }
}

/// Checkpoint store whose saves always fail, for run-fatal paths.
#[derive(Clone, Default)]
pub struct BrokenCheckpointStore;

#[async_trait]
impl CheckpointStore for BrokenCheckpointStore {
    async fn load(&self, _source: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(None)
    }

    async fn save(&self, _source: &str, _checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        Err(CheckpointError::Backend {
            message: "checkpoint volume offline".to_string(),
        })
    }
}

/// Checkpoint store that accepts saves but never persists them, simulating a
/// crash before the checkpoint became durable.
#[derive(Clone, Default)]
pub struct AmnesicCheckpointStore;

#[async_trait]
impl CheckpointStore for AmnesicCheckpointStore {
    async fn load(&self, _source: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(None)
    }

    async fn save(&self, _source: &str, _checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        Ok(())
    }
}
