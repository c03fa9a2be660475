//! Sweep Demo: End-to-End Incremental Ingestion
//!
//! This demonstration runs a full ingestion pipeline against a simulated
//! paginated forum, twice, to show the two properties the crate is built
//! around:
//!
//! 1. Checkpointed traversal: the first sweep walks the listing page by page
//!    and records a durable high-water mark after each completed page.
//! 2. Idempotent resume: the second sweep resumes past the checkpoint,
//!    deduplicates anything it sees again, and leaves the destination store
//!    unchanged.
//!
//! The source is an in-process `httpmock` server serving three listing
//! pages; the destination is the in-memory document store. Progress events
//! stream to stdout through the event bus.
//!
//! Running This Demo:
//! ```bash
//! cargo run --example sweep_demo
//! ```

use std::sync::Arc;

use httpmock::prelude::*;
use miette::Result;
use tracing::info;
use url::Url;

use tideline::checkpoint::InMemoryCheckpointStore;
use tideline::document::{BodyType, Document, document_id};
use tideline::event_bus::{EventBus, StdOutSink};
use tideline::extract::{ExtractError, from_fn};
use tideline::frontier::{FrontierCursor, PaginatedFrontier};
use tideline::index::InMemoryDocumentStore;
use tideline::pipeline::{IngestSettings, PipelineDriver};
use tideline::telemetry::init_tracing;

const PAGE_SIZE: usize = 4;

/// Serve a tiny forum listing: two full pages and one short page.
async fn serve_forum(server: &MockServer) {
    let pages: &[(u64, &[&str])] = &[
        (0, &["intro thread", "rules", "welcome 2024", "faq"]),
        (4, &["show and tell", "monthly update", "help wanted", "off topic"]),
        (8, &["site meta", "archive notes"]),
    ];
    for (offset, titles) in pages {
        let body = titles.join("\n");
        let offset = *offset;
        server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path("/listing")
                    .query_param("start", offset.to_string());
                then.status(200)
                    .header("content-type", "text/plain")
                    .body(body);
            })
            .await;
    }
    // Anything past the short page stays empty.
    server
        .mock_async(|when, then| {
            when.method(GET).path("/listing");
            then.status(200).body("");
        })
        .await;
}

/// One document per listing line, with the deterministic id scheme.
fn title_extractor() -> impl tideline::extract::Extractor {
    from_fn(|content, _cursor: &FrontierCursor| {
        content
            .body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let title = line.trim();
                Document::builder()
                    .id(document_id("demo-forum", title))
                    .body(title.to_string(), BodyType::Raw)
                    .url(content.url.as_str())
                    .domain("demo-forum.example")
                    .build()
                    .map_err(|e| ExtractError::Malformed {
                        reason: e.to_string(),
                    })
            })
            .collect()
    })
}

fn build_driver(
    base: String,
    store: Arc<InMemoryDocumentStore>,
    checkpoints: Arc<InMemoryCheckpointStore>,
    bus: &EventBus,
) -> Result<PipelineDriver> {
    let settings = IngestSettings::new("demo-forum", "https://index.example")
        .with_page_size(PAGE_SIZE)
        .with_batch_size(3);
    let driver = PipelineDriver::builder()
        .settings(settings)
        .frontier(PaginatedFrontier::new(PAGE_SIZE))
        .extractor(title_extractor())
        .store(store)
        .checkpoints(checkpoints)
        .locator(move |cursor: &FrontierCursor| {
            let FrontierCursor::Offset { offset } = cursor else {
                unreachable!("paginated source");
            };
            Url::parse(&format!("{base}/listing?start={offset}")).expect("valid url")
        })
        .emitter(Arc::new(bus.get_emitter()))
        .build()?;
    Ok(driver)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info,tideline=debug");
    miette::set_panic_hook();

    info!("🌊 tideline sweep demo: incremental ingestion of a mock forum");

    let server = MockServer::start_async().await;
    serve_forum(&server).await;

    let store = Arc::new(InMemoryDocumentStore::new());
    let checkpoints = Arc::new(InMemoryCheckpointStore::new());

    let bus = EventBus::with_sink(StdOutSink::default());
    bus.listen_for_events();

    // ✅ SWEEP 1: cold start, no checkpoint.
    info!("📥 Sweep 1: cold start");
    let mut driver = build_driver(
        server.base_url(),
        Arc::clone(&store),
        Arc::clone(&checkpoints),
        &bus,
    )?;
    let first = driver.run().await?;
    info!("   ✓ {}", first.headline());
    info!("   ✓ store now holds {} documents", store.len());
    if let Some(cp) = checkpoints.get("demo-forum") {
        info!("   ✓ checkpoint rests at {}", cp.cursor);
    }

    // ✅ SWEEP 2: warm resume over an unchanged source.
    info!("🔁 Sweep 2: resume over the same listing");
    let mut driver = build_driver(
        server.base_url(),
        Arc::clone(&store),
        Arc::clone(&checkpoints),
        &bus,
    )?;
    let second = driver.run().await?;
    info!("   ✓ {}", second.headline());
    info!(
        "   ✓ nothing re-indexed: {} new writes, store still holds {} documents",
        second.docs_indexed,
        store.len()
    );

    bus.stop_listener().await;

    info!("✅ Demo complete: re-running a sweep is always safe");
    Ok(())
}
