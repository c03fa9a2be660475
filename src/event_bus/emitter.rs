use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

use super::event::Event;

/// Trait representing an abstract event emitter that pipeline stages can clone.
pub trait EventEmitter: Send + Sync + fmt::Debug {
    /// Emit an event in a synchronous, non-blocking manner.
    fn emit(&self, event: Event) -> Result<(), EmitterError>;
}

/// Errors that can occur when emitting an event.
#[derive(Debug, Error, Diagnostic)]
pub enum EmitterError {
    #[error("event bus closed")]
    #[diagnostic(
        code(tideline::event_bus::closed),
        help("The event bus listener has shut down; events can no longer be delivered.")
    )]
    Closed,

    #[error("event lag exceeded buffer; dropped {0} messages")]
    #[diagnostic(code(tideline::event_bus::lagged))]
    Lagged(usize),

    #[error("event emission failed: {0}")]
    #[diagnostic(code(tideline::event_bus::other))]
    Other(String),
}

impl EmitterError {
    pub fn other(error: impl Into<String>) -> Self {
        Self::Other(error.into())
    }
}

/// Emitter backed by the bus's unbounded channel. Cheap to clone; every
/// clone feeds the same listener.
#[derive(Clone, Debug)]
pub struct BusEmitter {
    sender: flume::Sender<Event>,
}

impl BusEmitter {
    pub(crate) fn new(sender: flume::Sender<Event>) -> Self {
        Self { sender }
    }
}

impl EventEmitter for BusEmitter {
    fn emit(&self, event: Event) -> Result<(), EmitterError> {
        self.sender.send(event).map_err(|_| EmitterError::Closed)
    }
}

/// Emitter that drops every event, for callers that do not want progress
/// reporting.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEmitter;

impl EventEmitter for NullEmitter {
    fn emit(&self, _event: Event) -> Result<(), EmitterError> {
        Ok(())
    }
}
