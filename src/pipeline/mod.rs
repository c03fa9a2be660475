/*!
The pipeline driver and its run-scoped plumbing.

One run of the pipeline sweeps one source: the frontier issues cursors, each
cursor becomes a unit of fetch → extract → dedupe → index work, and the
checkpoint store records the high-water mark of fully-completed units. The
pieces here tie the subsystems together:

- [`IngestSettings`]: the flat configuration surface for a run.
- [`RunContext`]: settings, existence index, progress emitter, cancellation
  and counters, passed explicitly through every stage.
- [`PipelineDriver`]: the orchestrator and single checkpoint writer.
- [`RunSummary`]: what the run accomplished, failures included.
*/

pub mod context;
pub mod driver;
pub mod settings;
pub mod summary;

pub use context::{CounterSnapshot, RunContext, RunCounters};
pub use driver::{PipelineDriver, PipelineDriverBuilder, PipelineError, UnitLocator};
pub use settings::{IngestSettings, SettingsError};
pub use summary::RunSummary;
