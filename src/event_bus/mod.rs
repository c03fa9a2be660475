//! Progress reporting for pipeline runs: a small fan-out bus plus sinks.
//!
//! Pipeline stages emit [`Event`] values through an [`EventEmitter`]; the
//! [`EventBus`] forwards each event to every configured [`EventSink`].
//! Events are advisory and never participate in control flow.

pub mod bus;
pub mod emitter;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use emitter::{BusEmitter, EmitterError, EventEmitter, NullEmitter};
pub use event::{BatchEvent, DiagnosticEvent, Event, RunEvent, UnitEvent};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
