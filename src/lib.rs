//! # Tideline: Incremental Ingestion Pipeline
//!
//! Tideline is a reusable ingestion core for site scrapers: it walks a
//! paginated or dated source incrementally, survives transient failures, and
//! upserts normalized documents into a search index without ever creating
//! duplicates, even across crashes and re-runs.
//!
//! ## Core Concepts
//!
//! - **Document**: the canonical normalized record, keyed by a deterministic
//!   id derived from source identity
//! - **Frontier**: the ordered sequence of source locations still to visit
//!   (page offsets or calendar months)
//! - **Checkpoint**: the durable high-water mark of fully-completed frontier
//!   units, enabling crash-safe resume
//! - **Fetcher**: single-URL retrieval with transient/fatal classification
//!   and capped exponential backoff
//! - **Existence Index**: "has this id already been accepted?" before any
//!   costly write
//! - **Batch Indexer**: idempotent bulk upserts with partial-failure
//!   isolation and failed-subset retry
//! - **Pipeline Driver**: orchestrates the stages with bounded parallelism
//!   and in-order checkpointing
//!
//! ## Quick Start
//!
//! ### Building Documents
//!
//! Extractors produce [`document::Document`] values with deterministic ids:
//!
//! ```
//! use tideline::document::{document_id, BodyType, DocType, Document};
//!
//! let doc = Document::builder()
//!     .id(document_id("forum", "5124918"))
//!     .title("Fee estimation under load")
//!     .body("full post text", BodyType::Raw)
//!     .url("https://forum.example/t/5124918")
//!     .domain("https://forum.example")
//!     .doc_type(DocType::Topic)
//!     .build()
//!     .unwrap();
//!
//! // Re-ingesting the same source item always yields the same id, which is
//! // what makes re-runs safe: the destination store upserts by id.
//! assert_eq!(doc.id, "forum-5124918");
//! ```
//!
//! ### Walking a Frontier
//!
//! ```
//! use tideline::frontier::{Frontier, PaginatedFrontier, Step, UnitFeedback};
//!
//! let mut frontier = PaginatedFrontier::new(40);
//! let Step::Next(page) = frontier.advance() else { panic!() };
//!
//! // A short page means the listing is exhausted; the next page is never
//! // fetched.
//! frontier.record(&page, UnitFeedback::Items(17));
//! assert_eq!(frontier.advance(), Step::Done);
//! ```
//!
//! ### Running a Pipeline
//!
//! ```no_run
//! use std::sync::Arc;
//! use tideline::checkpoint::JsonFileCheckpointStore;
//! use tideline::extract::from_fn;
//! use tideline::frontier::PaginatedFrontier;
//! use tideline::index::HttpDocumentStore;
//! use tideline::pipeline::{IngestSettings, PipelineDriver};
//! use url::Url;
//!
//! # async fn run() -> miette::Result<()> {
//! let settings = IngestSettings::from_env()?;
//! let store = Arc::new(
//!     HttpDocumentStore::builder(Url::parse(&settings.base_url).unwrap()).build()?,
//! );
//!
//! let mut driver = PipelineDriver::builder()
//!     .settings(settings)
//!     .frontier(PaginatedFrontier::new(40))
//!     .extractor(from_fn(|_content, _cursor| Ok(Vec::new())))
//!     .store(store)
//!     .checkpoints(Arc::new(JsonFileCheckpointStore::new("checkpoints")))
//!     .locator(|cursor| {
//!         Url::parse(&format!("https://forum.example/list?{cursor}")).unwrap()
//!     })
//!     .build()?;
//!
//! let summary = driver.run().await?;
//! println!("{}", summary.headline());
//! # Ok(())
//! # }
//! ```
//!
//! ## Crash Safety
//!
//! The driver persists a checkpoint for a frontier unit only after every
//! document of that unit, and of all earlier-issued units, has been durably
//! indexed. A crash between indexing and checkpointing makes the next run
//! re-fetch the unit; the re-index is a no-op overwrite, never a duplicate.
//! Stopping a run with a [`control::CancelHandle`] is safe at any time for
//! the same reason.
//!
//! ## Observability
//!
//! Stages emit typed progress events through an [`event_bus::EventBus`] with
//! pluggable sinks, and `tracing` spans cover every async seam. Neither
//! affects control flow; see [`telemetry`] for subscriber setup.

pub mod checkpoint;
pub mod control;
pub mod document;
pub mod event_bus;
pub mod extract;
pub mod fetch;
pub mod frontier;
pub mod index;
pub mod pipeline;
pub mod telemetry;
pub mod types;
