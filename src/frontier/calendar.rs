//! Month-by-month traversal of dated archives.

use tracing::debug;

use super::{Frontier, FrontierCursor, FrontierError, Step, UnitFeedback};
use crate::checkpoint::Checkpoint;

/// When a calendar sweep should stop.
///
/// Dated archives have no natural end: next month always exists. The caller
/// picks the bound instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopRule {
    /// Sweep up to and including this month (e.g., the current month).
    Until { year: i32, month: u32 },
    /// Stop once this many completed months in a row came back empty.
    ///
    /// "In a row" is completion order; with units finishing out of order it
    /// approximates calendar order, which is all the guard needs.
    EmptyStreak(u32),
}

/// Frontier over `(year, month)` cursors, wrapping December into January of
/// the next year.
///
/// Months are independent units, so unlike [`super::PaginatedFrontier`] this
/// frontier issues cursors eagerly: the driver may keep several months in
/// flight at once. Termination comes from the [`StopRule`], fed by
/// [`Frontier::record`] for the empty-streak variant.
///
/// # Examples
///
/// ```
/// use tideline::frontier::{CalendarFrontier, Frontier, Step, StopRule};
///
/// let mut frontier =
///     CalendarFrontier::new(2020, 11, StopRule::Until { year: 2021, month: 1 }).unwrap();
/// let mut seen = vec![];
/// while let Step::Next(cursor) = frontier.advance() {
///     seen.push(cursor.to_string());
/// }
/// assert_eq!(seen, ["2020-11", "2020-12", "2021-01"]);
/// ```
#[derive(Debug)]
pub struct CalendarFrontier {
    origin: (i32, u32),
    next: (i32, u32),
    stop: StopRule,
    empty_streak: u32,
    done: bool,
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn check_month(month: u32) -> Result<(), FrontierError> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(FrontierError::InvalidMonth { month })
    }
}

impl CalendarFrontier {
    /// Start the sweep at `(year, month)` with the given stop rule.
    pub fn new(year: i32, month: u32, stop: StopRule) -> Result<Self, FrontierError> {
        check_month(month)?;
        if let StopRule::Until { month, .. } = stop {
            check_month(month)?;
        }
        Ok(Self {
            origin: (year, month),
            next: (year, month),
            stop,
            empty_streak: 0,
            done: false,
        })
    }

    fn past_stop(&self) -> bool {
        match self.stop {
            StopRule::Until { year, month } => self.next > (year, month),
            StopRule::EmptyStreak(limit) => self.empty_streak >= limit,
        }
    }
}

impl Frontier for CalendarFrontier {
    fn current(&self) -> Option<FrontierCursor> {
        if self.done || self.past_stop() {
            None
        } else {
            Some(FrontierCursor::month(self.next.0, self.next.1))
        }
    }

    fn advance(&mut self) -> Step {
        if self.done || self.past_stop() {
            self.done = true;
            return Step::Done;
        }
        let (year, month) = self.next;
        self.next = next_month(year, month);
        Step::Next(FrontierCursor::month(year, month))
    }

    fn record(&mut self, cursor: &FrontierCursor, feedback: UnitFeedback) {
        match feedback {
            UnitFeedback::Items(0) => {
                self.empty_streak += 1;
                debug!(%cursor, streak = self.empty_streak, "empty month");
            }
            UnitFeedback::Items(_) => self.empty_streak = 0,
            // Unknown yield: neither evidence of emptiness nor of content.
            UnitFeedback::SkippedFatal => {}
        }
    }

    fn resume(&mut self, checkpoint: Option<&Checkpoint>) -> Result<(), FrontierError> {
        self.empty_streak = 0;
        self.done = false;
        match checkpoint.map(|cp| &cp.cursor) {
            Some(FrontierCursor::Month { year, month }) => {
                check_month(*month)?;
                self.next = next_month(*year, *month);
            }
            Some(other) => {
                return Err(FrontierError::CursorModeMismatch {
                    cursor: other.clone(),
                });
            }
            None => self.next = self.origin,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn take(frontier: &mut CalendarFrontier) -> FrontierCursor {
        match frontier.advance() {
            Step::Next(c) => c,
            other => panic!("expected a cursor, got {other:?}"),
        }
    }

    #[test]
    fn december_wraps_to_january_next_year() {
        let mut f =
            CalendarFrontier::new(2020, 12, StopRule::Until { year: 2021, month: 6 }).unwrap();
        assert_eq!(take(&mut f), FrontierCursor::month(2020, 12));
        assert_eq!(take(&mut f), FrontierCursor::month(2021, 1));
    }

    #[test]
    fn mid_year_advance() {
        let mut f =
            CalendarFrontier::new(2021, 5, StopRule::Until { year: 2021, month: 12 }).unwrap();
        assert_eq!(take(&mut f), FrontierCursor::month(2021, 5));
        assert_eq!(take(&mut f), FrontierCursor::month(2021, 6));
    }

    #[test]
    fn until_bound_is_inclusive() {
        let mut f =
            CalendarFrontier::new(2021, 11, StopRule::Until { year: 2021, month: 12 }).unwrap();
        assert_eq!(take(&mut f), FrontierCursor::month(2021, 11));
        assert_eq!(take(&mut f), FrontierCursor::month(2021, 12));
        assert_eq!(f.advance(), Step::Done);
    }

    #[test]
    fn issues_eagerly_without_feedback() {
        let mut f =
            CalendarFrontier::new(2021, 1, StopRule::Until { year: 2021, month: 12 }).unwrap();
        for month in 1..=4 {
            assert_eq!(take(&mut f), FrontierCursor::month(2021, month));
        }
    }

    #[test]
    fn empty_streak_stops_issuance() {
        let mut f = CalendarFrontier::new(2021, 1, StopRule::EmptyStreak(2)).unwrap();
        let a = take(&mut f);
        let b = take(&mut f);
        f.record(&a, UnitFeedback::Items(0));
        f.record(&b, UnitFeedback::Items(0));
        assert_eq!(f.advance(), Step::Done);
    }

    #[test]
    fn nonempty_month_resets_streak() {
        let mut f = CalendarFrontier::new(2021, 1, StopRule::EmptyStreak(2)).unwrap();
        let a = take(&mut f);
        let b = take(&mut f);
        let c = take(&mut f);
        f.record(&a, UnitFeedback::Items(0));
        f.record(&b, UnitFeedback::Items(31));
        f.record(&c, UnitFeedback::Items(0));
        assert!(matches!(f.advance(), Step::Next(_)));
    }

    #[test]
    fn fatal_skip_leaves_streak_untouched() {
        let mut f = CalendarFrontier::new(2021, 1, StopRule::EmptyStreak(2)).unwrap();
        let a = take(&mut f);
        let b = take(&mut f);
        let c = take(&mut f);
        f.record(&a, UnitFeedback::Items(0));
        f.record(&b, UnitFeedback::SkippedFatal);
        f.record(&c, UnitFeedback::Items(0));
        assert_eq!(f.advance(), Step::Done);
    }

    #[test]
    fn resume_starts_the_month_after_checkpoint() {
        let cp = Checkpoint::new(FrontierCursor::month(2020, 12), Utc::now());
        let mut f =
            CalendarFrontier::new(2019, 1, StopRule::Until { year: 2021, month: 6 }).unwrap();
        f.resume(Some(&cp)).unwrap();
        assert_eq!(take(&mut f), FrontierCursor::month(2021, 1));
    }

    #[test]
    fn resume_rejects_offset_checkpoint() {
        let cp = Checkpoint::new(FrontierCursor::offset(40), Utc::now());
        let mut f =
            CalendarFrontier::new(2019, 1, StopRule::Until { year: 2021, month: 6 }).unwrap();
        let err = f.resume(Some(&cp)).unwrap_err();
        assert!(matches!(err, FrontierError::CursorModeMismatch { .. }));
    }

    #[test]
    fn invalid_month_is_rejected() {
        let err =
            CalendarFrontier::new(2021, 13, StopRule::EmptyStreak(3)).unwrap_err();
        assert!(matches!(err, FrontierError::InvalidMonth { month: 13 }));
    }
}
