/*! Orchestration of one ingestion run.

[`PipelineDriver`] walks the frontier and, for each issued cursor, runs the
unit stages in data-flow order: fetch, extract, dedupe, index. Units are
independent, so up to `fetch_width` of them run concurrently; within one unit
the stages are sequential.

Checkpointing is the part that must not be clever. A completed unit parks
until every earlier-issued unit has also completed, and only then is its
cursor written to the checkpoint store, in issue order, by this task alone.
Out-of-order fetch completion therefore never produces a checkpoint that
skips a page: resuming re-fetches at most, never misses.

A unit that fails fatally (permanent HTTP status, unparseable payload) is
logged, counted, and skipped; the frontier advances past it so one dead page
cannot stall a source forever. Only storage-layer faults end the run: the
destination store staying unreachable, the source staying unreachable past
the retry budget, or a checkpoint write failing.
*/

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use crate::control::CancelToken;
use crate::document::Document;
use crate::event_bus::{Event, EventEmitter, NullEmitter};
use crate::extract::Extractor;
use crate::fetch::{BackoffPolicy, FetchError, Fetcher};
use crate::frontier::{Frontier, FrontierCursor, FrontierError, Step, UnitFeedback};
use crate::index::{
    BatchIndexer, BatchResult, DocumentStore, ExistenceIndex, IndexError, IndexFailure, StoreError,
};
use crate::types::UnitSeq;

use super::{IngestSettings, RunContext, RunSummary, SettingsError};

/// Maps a frontier cursor to the URL holding that unit's content.
///
/// Site-specific, like the extractor: a paginated forum appends an offset
/// query parameter, a mailing-list archive interpolates year and month into
/// a path.
pub type UnitLocator = Arc<dyn Fn(&FrontierCursor) -> Url + Send + Sync>;

/// Faults that end a run. Everything else is absorbed per unit or per
/// document and reported in the [`RunSummary`].
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Frontier(#[from] FrontierError),

    /// Continuing without a durable resume point would cause silent
    /// re-processing or skips on the next run, so this stops everything.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),

    /// The source endpoint kept failing past the retry budget.
    #[error("source unreachable after retries: {url}")]
    #[diagnostic(
        code(tideline::pipeline::source_unavailable),
        help("The source endpoint kept failing transiently; the run stops instead of skipping every page.")
    )]
    SourceUnavailable {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("pipeline misconfigured: {reason}")]
    #[diagnostic(code(tideline::pipeline::config))]
    Config { reason: String },
}

/// What one frontier unit produced.
enum UnitOutcome {
    /// The unit ran to completion; `extracted` is its item yield.
    Indexed {
        extracted: usize,
        result: BatchResult,
    },
    /// The unit was skipped and the frontier should move past it.
    Skipped,
    /// The run was cancelled while this unit was in flight.
    Cancelled,
    /// A storage-layer fault; the whole run must stop.
    RunFatal(PipelineError),
}

struct UnitReport {
    seq: UnitSeq,
    cursor: FrontierCursor,
    outcome: UnitOutcome,
}

type UnitFuture = Pin<Box<dyn Future<Output = UnitReport> + Send>>;

/// Drives a full ingestion run over one source.
///
/// ```no_run
/// use std::sync::Arc;
/// use tideline::frontier::{FrontierCursor, PaginatedFrontier};
/// use tideline::index::HttpDocumentStore;
/// use tideline::checkpoint::JsonFileCheckpointStore;
/// use tideline::extract::from_fn;
/// use tideline::pipeline::{IngestSettings, PipelineDriver};
/// use url::Url;
///
/// # async fn run() -> miette::Result<()> {
/// let settings = IngestSettings::new("forum", "https://index.example");
/// let store = Arc::new(
///     HttpDocumentStore::builder(Url::parse("https://index.example").unwrap()).build()?,
/// );
/// let mut driver = PipelineDriver::builder()
///     .settings(settings)
///     .frontier(PaginatedFrontier::new(40))
///     .extractor(from_fn(|_content, _cursor| Ok(Vec::new())))
///     .store(store)
///     .checkpoints(Arc::new(JsonFileCheckpointStore::new("checkpoints")))
///     .locator(|cursor| {
///         Url::parse(&format!("https://forum.example/list?start={cursor}")).unwrap()
///     })
///     .build()?;
/// let summary = driver.run().await?;
/// println!("{}", summary.headline());
/// # Ok(())
/// # }
/// ```
pub struct PipelineDriver {
    frontier: Box<dyn Frontier>,
    fetcher: Fetcher,
    extractor: Arc<dyn Extractor>,
    indexer: BatchIndexer,
    checkpoints: Arc<dyn CheckpointStore>,
    locator: UnitLocator,
    ctx: RunContext,
}

impl PipelineDriver {
    #[must_use]
    pub fn builder() -> PipelineDriverBuilder {
        PipelineDriverBuilder::default()
    }

    /// Context shared with the unit stages, mostly useful for inspecting
    /// counters mid-run from another task.
    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Run the pipeline to completion, cancellation, or a run-fatal fault.
    ///
    /// On `Ok`, the summary covers everything the run accomplished,
    /// including accepted partial failures. On `Err`, all fully-completed
    /// units up to the fault are already checkpointed; re-running resumes
    /// behind them.
    #[instrument(skip(self), fields(source = %self.ctx.settings.source_name, run_id = %self.ctx.run_id), err)]
    pub async fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let started_at = Utc::now();
        let source = self.ctx.settings.source_name.clone();

        // INIT: position the frontier after the last completed unit.
        let checkpoint = match &self.ctx.settings.resume_override {
            Some(cursor) => {
                info!(%cursor, "resume override set, ignoring stored checkpoint");
                Some(Checkpoint::new(cursor.clone(), Utc::now()))
            }
            None => self.checkpoints.load(&source).await?,
        };
        match &checkpoint {
            Some(cp) => info!(cursor = %cp.cursor, "resuming from checkpoint"),
            None => info!("no checkpoint, starting from origin"),
        }
        self.frontier.resume(checkpoint.as_ref())?;

        let _ = self.ctx.emitter.emit(Event::run(
            self.ctx.run_id.clone(),
            "driver",
            format!("run started for {source}"),
        ));

        let width = self.ctx.settings.fetch_width;
        let mut in_flight: FuturesUnordered<UnitFuture> = FuturesUnordered::new();
        let mut parked: BTreeMap<UnitSeq, FrontierCursor> = BTreeMap::new();
        let mut failures: Vec<IndexFailure> = Vec::new();
        let mut next_seq: UnitSeq = 0;
        let mut commit_seq: UnitSeq = 0;
        let mut frontier_done = false;
        let mut cancelled = false;

        loop {
            while !cancelled && !frontier_done && in_flight.len() < width {
                if self.ctx.cancel.is_cancelled() {
                    info!("cancellation requested, draining in-flight units");
                    cancelled = true;
                    break;
                }
                match self.frontier.advance() {
                    Step::Next(cursor) => {
                        debug!(%cursor, seq = next_seq, "issuing unit");
                        in_flight.push(self.unit_future(next_seq, cursor));
                        next_seq += 1;
                    }
                    Step::Wait => break,
                    Step::Done => frontier_done = true,
                }
            }

            let Some(report) = in_flight.next().await else {
                break;
            };

            match report.outcome {
                UnitOutcome::RunFatal(err) => return Err(err),
                UnitOutcome::Cancelled => {
                    cancelled = true;
                }
                UnitOutcome::Indexed { extracted, result } => {
                    self.frontier
                        .record(&report.cursor, UnitFeedback::Items(extracted));
                    failures.extend(result.failed);
                    parked.insert(report.seq, report.cursor);
                }
                UnitOutcome::Skipped => {
                    self.frontier
                        .record(&report.cursor, UnitFeedback::SkippedFatal);
                    parked.insert(report.seq, report.cursor);
                }
            }

            // Commit the contiguous prefix of completed units, in issue
            // order, from this task only.
            while let Some(cursor) = parked.remove(&commit_seq) {
                let cp = Checkpoint::new(cursor, Utc::now());
                self.checkpoints.save(&source, &cp).await?;
                debug!(cursor = %cp.cursor, seq = commit_seq, "checkpoint advanced");
                let _ = self.ctx.emitter.emit(Event::unit_with_seq(
                    cp.cursor.to_string(),
                    commit_seq,
                    "checkpoint",
                    "unit checkpointed",
                ));
                commit_seq += 1;
            }
        }

        let summary = RunSummary::assemble(
            self.ctx.run_id.clone(),
            source,
            started_at,
            cancelled,
            self.ctx.counters.snapshot(),
            failures,
        );
        info!(
            indexed = summary.docs_indexed,
            failed = summary.docs_failed,
            cancelled = summary.cancelled,
            "run finished"
        );
        let _ = self.ctx.emitter.emit(Event::run(
            self.ctx.run_id.clone(),
            "driver",
            summary.headline(),
        ));
        Ok(summary)
    }

    fn unit_future(&self, seq: UnitSeq, cursor: FrontierCursor) -> UnitFuture {
        let url = (self.locator)(&cursor);
        let fetcher = self.fetcher.clone();
        let extractor = Arc::clone(&self.extractor);
        let indexer = self.indexer.clone();
        let ctx = self.ctx.clone();
        Box::pin(async move {
            let outcome = process_unit(&cursor, url, &fetcher, &*extractor, &indexer, &ctx).await;
            UnitReport {
                seq,
                cursor,
                outcome,
            }
        })
    }
}

/// One frontier unit, stages in order: fetch, extract, dedupe, index.
async fn process_unit(
    cursor: &FrontierCursor,
    url: Url,
    fetcher: &Fetcher,
    extractor: &dyn Extractor,
    indexer: &BatchIndexer,
    ctx: &RunContext,
) -> UnitOutcome {
    ctx.counters.unit_visited();
    let _ = ctx
        .emitter
        .emit(Event::unit(cursor.to_string(), "fetch", "unit started"));

    // FETCHING
    let content = match fetcher.fetch_with_retry(&url, &ctx.cancel).await {
        Ok(content) => content,
        Err(FetchError::Cancelled) => return UnitOutcome::Cancelled,
        Err(err @ FetchError::Fatal { .. }) => {
            warn!(%cursor, %url, error = %err, "fatal fetch, skipping unit");
            ctx.counters.unit_failed_fatal();
            let _ = ctx.emitter.emit(Event::unit(
                cursor.to_string(),
                "fetch",
                format!("skipped: {err}"),
            ));
            return UnitOutcome::Skipped;
        }
        Err(err @ FetchError::Transient { .. }) => {
            // Retry budget exhausted: skipping would make every remaining
            // unit fail the same way, so the run stops here.
            return UnitOutcome::RunFatal(PipelineError::SourceUnavailable {
                url: url.to_string(),
                source: err,
            });
        }
        Err(err) => return UnitOutcome::RunFatal(PipelineError::Fetch(err)),
    };
    ctx.counters.unit_fetched();

    // EXTRACTING: zero documents is a valid yield, a failed parse is not.
    let documents = match extractor.extract(&content, cursor) {
        Ok(documents) => documents,
        Err(err) => {
            warn!(%cursor, error = %err, "extraction failed, skipping unit");
            ctx.counters.unit_failed_fatal();
            let _ = ctx.emitter.emit(Event::unit(
                cursor.to_string(),
                "extract",
                format!("skipped: {err}"),
            ));
            return UnitOutcome::Skipped;
        }
    };
    let extracted = documents.len();
    ctx.counters.extracted(extracted as u64);

    // DEDUPING
    let fresh = match dedupe(documents, ctx).await {
        Ok(fresh) => fresh,
        Err(err) => return UnitOutcome::RunFatal(PipelineError::Store(err)),
    };

    // INDEXING
    let result = match indexer.submit(fresh, &ctx.cancel).await {
        Ok(result) => result,
        Err(IndexError::Cancelled) => return UnitOutcome::Cancelled,
        Err(err) => return UnitOutcome::RunFatal(PipelineError::Index(err)),
    };
    ctx.existence.mark_indexed(result.accepted.iter().cloned());
    ctx.counters.indexed(
        result.accepted.len() as u64,
        result.created as u64,
        result.updated as u64,
    );
    ctx.counters.failed(result.failed.len() as u64);

    let _ = ctx.emitter.emit(Event::unit(
        cursor.to_string(),
        "index",
        format!(
            "{} items, {} indexed, {} failed",
            extracted,
            result.accepted.len(),
            result.failed.len()
        ),
    ));
    UnitOutcome::Indexed { extracted, result }
}

/// Drop documents whose id is already in the destination store. The check
/// and the later write are not atomic; a concurrent double-write of the same
/// id is benign because writes are idempotent upserts.
async fn dedupe(documents: Vec<Document>, ctx: &RunContext) -> Result<Vec<Document>, StoreError> {
    let mut fresh = Vec::with_capacity(documents.len());
    let mut duplicates: u64 = 0;
    for doc in documents {
        if ctx.existence.exists(&doc.id).await? {
            debug!(id = %doc.id, "duplicate, dropping");
            duplicates += 1;
        } else {
            fresh.push(doc);
        }
    }
    ctx.counters.deduped(duplicates);
    Ok(fresh)
}

/// Builder for [`PipelineDriver`].
///
/// Required: settings, frontier, extractor, store, checkpoints, locator.
/// The fetcher and indexer are derived from settings unless overridden.
#[derive(Default)]
pub struct PipelineDriverBuilder {
    settings: Option<IngestSettings>,
    frontier: Option<Box<dyn Frontier>>,
    extractor: Option<Arc<dyn Extractor>>,
    store: Option<Arc<dyn DocumentStore>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    locator: Option<UnitLocator>,
    emitter: Option<Arc<dyn EventEmitter>>,
    cancel: Option<CancelToken>,
    fetcher: Option<Fetcher>,
}

impl PipelineDriverBuilder {
    #[must_use]
    pub fn settings(mut self, settings: IngestSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn frontier(mut self, frontier: impl Frontier + 'static) -> Self {
        self.frontier = Some(Box::new(frontier));
        self
    }

    #[must_use]
    pub fn extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    #[must_use]
    pub fn locator(mut self, locator: impl Fn(&FrontierCursor) -> Url + Send + Sync + 'static) -> Self {
        self.locator = Some(Arc::new(locator));
        self
    }

    /// Progress events go here; defaults to dropping them.
    #[must_use]
    pub fn emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Replace the settings-derived fetcher, mostly for tuned user agents.
    #[must_use]
    pub fn fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn build(self) -> Result<PipelineDriver, PipelineError> {
        let settings = self.settings.ok_or_else(|| missing("settings"))?;
        let frontier = self.frontier.ok_or_else(|| missing("frontier"))?;
        let extractor = self.extractor.ok_or_else(|| missing("extractor"))?;
        let store = self.store.ok_or_else(|| missing("store"))?;
        let checkpoints = self.checkpoints.ok_or_else(|| missing("checkpoints"))?;
        let locator = self.locator.ok_or_else(|| missing("locator"))?;

        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NullEmitter));
        let cancel = self.cancel.unwrap_or_else(CancelToken::never);
        let backoff = BackoffPolicy::new(settings.backoff_base, settings.backoff_cap);
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Fetcher::builder()
                .timeout(settings.request_timeout)
                .max_attempts(settings.max_retries)
                .backoff(backoff.clone())
                .build()?,
        };
        let indexer = BatchIndexer::builder(Arc::clone(&store))
            .batch_size(settings.batch_size)
            .backoff(backoff)
            .max_attempts(settings.max_retries)
            .refresh_after_batch(settings.refresh_after_batch)
            .emitter(Arc::clone(&emitter))
            .build();
        let existence = ExistenceIndex::new(store);
        let ctx = RunContext::new(Arc::new(settings), existence, emitter, cancel);

        Ok(PipelineDriver {
            frontier,
            fetcher,
            extractor,
            indexer,
            checkpoints,
            locator,
            ctx,
        })
    }
}

fn missing(what: &str) -> PipelineError {
    PipelineError::Config {
        reason: format!("{what} is required"),
    }
}
