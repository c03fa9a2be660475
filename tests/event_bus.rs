//! Event bus wiring: sinks receive what emitters send, and a live pipeline
//! run produces the expected lifecycle events.

mod common;

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use tokio::sync::mpsc;
use url::Url;

use common::{fast_settings, line_extractor};
use tideline::checkpoint::InMemoryCheckpointStore;
use tideline::event_bus::{ChannelSink, Event, EventBus, EventEmitter, MemorySink};
use tideline::frontier::FrontierCursor;
use tideline::frontier::PaginatedFrontier;
use tideline::index::InMemoryDocumentStore;
use tideline::pipeline::PipelineDriver;

async fn drain(bus: &EventBus) {
    // The listener task drains the channel before acking shutdown.
    tokio::time::sleep(Duration::from_millis(50)).await;
    bus.stop_listener().await;
}

#[tokio::test]
async fn memory_sink_captures_emitted_events() {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    bus.listen_for_events();

    let emitter = bus.get_emitter();
    emitter
        .emit(Event::unit("offset=0", "fetch", "unit started"))
        .unwrap();
    emitter
        .emit(Event::batch_progress(10, 40, 0, Some(3.0)))
        .unwrap();

    drain(&bus).await;

    let events = sink.snapshot();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].scope_label(), Some("fetch"));
    assert_eq!(events[1].message(), "indexed 10/40 documents, ETA 3s");
}

#[tokio::test]
async fn channel_sink_streams_to_a_consumer() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let bus = EventBus::with_sink(ChannelSink::new(tx));
    bus.listen_for_events();

    bus.get_emitter()
        .emit(Event::run("run-1", "driver", "run started"))
        .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event, Event::run("run-1", "driver", "run started"));
    bus.stop_listener().await;
}

#[tokio::test]
async fn added_sinks_see_later_events() {
    let first = MemorySink::new();
    let bus = EventBus::with_sink(first.clone());
    bus.listen_for_events();

    bus.get_emitter()
        .emit(Event::diagnostic("driver", "one"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = MemorySink::new();
    bus.add_sink(second.clone());
    bus.get_emitter()
        .emit(Event::diagnostic("driver", "two"))
        .unwrap();

    drain(&bus).await;
    assert_eq!(first.snapshot().len(), 2);
    assert_eq!(second.snapshot().len(), 1);
}

#[tokio::test]
async fn pipeline_run_emits_lifecycle_events() {
    let server = MockServer::start_async().await;
    let body = "t1\nt2";
    server
        .mock_async(move |when, then| {
            when.method(GET).path("/page");
            then.status(200).body(body);
        })
        .await;

    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    bus.listen_for_events();

    let base = server.base_url();
    let mut driver = PipelineDriver::builder()
        .settings(fast_settings("forum", "https://index.example").with_page_size(3))
        .frontier(PaginatedFrontier::new(3))
        .extractor(line_extractor("forum"))
        .store(Arc::new(InMemoryDocumentStore::new()))
        .checkpoints(Arc::new(InMemoryCheckpointStore::new()))
        .locator(move |cursor: &FrontierCursor| {
            Url::parse(&format!("{base}/page?cursor={cursor}")).unwrap()
        })
        .emitter(Arc::new(bus.get_emitter()))
        .build()
        .unwrap();

    driver.run().await.unwrap();
    drain(&bus).await;

    let events = sink.snapshot();
    let run_events: Vec<&Event> = events
        .iter()
        .filter(|e| matches!(e, Event::Run(_)))
        .collect();
    assert_eq!(run_events.len(), 2, "start and finish markers");
    assert!(run_events[0].message().contains("run started"));
    assert!(run_events[1].message().contains("2 indexed"));

    // The single unit produced fetch, index, and checkpoint events.
    assert!(
        events
            .iter()
            .any(|e| e.scope_label() == Some("checkpoint"))
    );
    assert!(
        events
            .iter()
            .any(|e| e.scope_label() == Some("index") && e.message().contains("2 indexed"))
    );
}
