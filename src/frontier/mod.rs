/*!
Frontier: the ordered sequence of source locations still to be visited.

A frontier hands out [`FrontierCursor`] values one work unit at a time and
learns from the driver, via [`Frontier::record`], how each unit turned out.
That feedback is what drives termination: a paginated listing ends on the
first short page, a calendar sweep ends on a caller-supplied stop rule.

Two modes cover the observed source shapes:

- [`PaginatedFrontier`]: cursor is an item offset, advanced by a fixed page
  size. A page that yields fewer items than the page size is the end of the
  listing, so at most one page is outstanding at a time ([`Step::Wait`] while
  it is in flight).
- [`CalendarFrontier`]: cursor is a `(year, month)` pair, advanced one month
  at a time with December wrapping into January of the next year. There is no
  natural end; a [`StopRule`] bounds the sweep. Months are independent, so the
  frontier issues cursors eagerly and the driver can keep several in flight.

Resuming positions the frontier immediately after a checkpointed cursor; with
no checkpoint it starts at the mode origin.
*/

pub mod calendar;
pub mod paginated;

pub use calendar::{CalendarFrontier, StopRule};
pub use paginated::PaginatedFrontier;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::checkpoint::Checkpoint;

/// Position within a frontier's ordering. Serializable so checkpoints can
/// carry it, totally ordered within a mode so checkpoints advance
/// monotonically.
///
/// Cross-mode comparisons are meaningless; a source never changes mode.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrontierCursor {
    /// Item offset into a paginated listing.
    Offset { offset: u64 },
    /// Year and month (1-12) in a dated archive.
    Month { year: i32, month: u32 },
}

impl FrontierCursor {
    #[must_use]
    pub fn offset(offset: u64) -> Self {
        FrontierCursor::Offset { offset }
    }

    #[must_use]
    pub fn month(year: i32, month: u32) -> Self {
        FrontierCursor::Month { year, month }
    }
}

impl fmt::Display for FrontierCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontierCursor::Offset { offset } => write!(f, "offset={offset}"),
            FrontierCursor::Month { year, month } => write!(f, "{year}-{month:02}"),
        }
    }
}

/// What `advance` produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Process this cursor next.
    Next(FrontierCursor),
    /// Nothing can be issued until an outstanding unit reports back.
    Wait,
    /// The frontier is exhausted.
    Done,
}

/// Outcome of a completed frontier unit, reported back via [`Frontier::record`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitFeedback {
    /// The unit was fetched and extracted; carries its item yield.
    Items(usize),
    /// The unit was skipped after a fatal fetch error. Says nothing about
    /// whether the position actually held items, so termination rules ignore
    /// it rather than treating it as empty.
    SkippedFatal,
}

/// Ordered producer of source locations, honoring the checkpoint.
pub trait Frontier: Send {
    /// The cursor the next `advance` would issue, if the frontier is open.
    fn current(&self) -> Option<FrontierCursor>;

    /// Issue the current cursor and move the frontier forward.
    fn advance(&mut self) -> Step;

    /// Report a completed unit. Drives short-page and stop-rule termination.
    fn record(&mut self, cursor: &FrontierCursor, feedback: UnitFeedback);

    /// Reposition after `checkpoint`, or at the mode origin when `None`.
    ///
    /// Fails if the checkpoint's cursor belongs to a different traversal mode,
    /// which the driver treats as a configuration fault rather than silently
    /// re-ingesting from the origin.
    fn resume(&mut self, checkpoint: Option<&Checkpoint>) -> Result<(), FrontierError>;
}

/// Construction and resume failures for frontiers.
#[derive(Debug, Error, Diagnostic)]
pub enum FrontierError {
    #[error("month {month} is out of range (expected 1-12)")]
    #[diagnostic(
        code(tideline::frontier::invalid_month),
        help("Calendar cursors use 1-based months: January is 1, December is 12.")
    )]
    InvalidMonth { month: u32 },

    #[error("checkpoint cursor {cursor} does not match this frontier mode")]
    #[diagnostic(
        code(tideline::frontier::cursor_mode_mismatch),
        help("A source keeps one traversal mode for its lifetime; clear the checkpoint if the source was reconfigured.")
    )]
    CursorModeMismatch { cursor: FrontierCursor },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_display_forms() {
        assert_eq!(FrontierCursor::offset(120).to_string(), "offset=120");
        assert_eq!(FrontierCursor::month(2021, 3).to_string(), "2021-03");
    }

    #[test]
    fn offset_cursors_order_by_offset() {
        assert!(FrontierCursor::offset(0) < FrontierCursor::offset(40));
    }

    #[test]
    fn month_cursors_order_year_first() {
        assert!(FrontierCursor::month(2020, 12) < FrontierCursor::month(2021, 1));
        assert!(FrontierCursor::month(2021, 1) < FrontierCursor::month(2021, 2));
    }

    #[test]
    fn cursor_serde_is_tagged() {
        let json = serde_json::to_string(&FrontierCursor::month(2020, 12)).unwrap();
        assert!(json.contains("\"kind\":\"month\""), "{json}");
        let back: FrontierCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FrontierCursor::month(2020, 12));
    }
}
