//! Offset-paginated traversal with the short-page termination rule.

use tracing::debug;

use super::{Frontier, FrontierCursor, FrontierError, Step, UnitFeedback};
use crate::checkpoint::Checkpoint;

/// Frontier over a listing paged by item offset (0, N, 2N, ...).
///
/// The listing's end is only discoverable by fetching: a page that yields
/// fewer than `page_size` items is the last one. Because that decision needs
/// the previous page's yield, `advance` hands out at most one unreported
/// cursor at a time and returns [`Step::Wait`] while it is outstanding. A
/// short page at offset k therefore guarantees offset k+N is never issued.
///
/// # Examples
///
/// ```
/// use tideline::frontier::{Frontier, PaginatedFrontier, Step, UnitFeedback};
///
/// let mut frontier = PaginatedFrontier::new(40);
/// let Step::Next(first) = frontier.advance() else { panic!() };
/// assert_eq!(frontier.advance(), Step::Wait);
///
/// // A full page keeps the listing open, a short one ends it.
/// frontier.record(&first, UnitFeedback::Items(40));
/// let Step::Next(second) = frontier.advance() else { panic!() };
/// frontier.record(&second, UnitFeedback::Items(17));
/// assert_eq!(frontier.advance(), Step::Done);
/// ```
#[derive(Debug)]
pub struct PaginatedFrontier {
    page_size: usize,
    origin: u64,
    next_offset: u64,
    outstanding: bool,
    done: bool,
}

impl PaginatedFrontier {
    /// Start at offset 0 with the given page size.
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self::starting_at(page_size, 0)
    }

    /// Start at an explicit origin offset.
    #[must_use]
    pub fn starting_at(page_size: usize, origin: u64) -> Self {
        Self {
            page_size: page_size.max(1),
            origin,
            next_offset: origin,
            outstanding: false,
            done: false,
        }
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

impl Frontier for PaginatedFrontier {
    fn current(&self) -> Option<FrontierCursor> {
        if self.done {
            None
        } else {
            Some(FrontierCursor::offset(self.next_offset))
        }
    }

    fn advance(&mut self) -> Step {
        if self.done {
            return Step::Done;
        }
        if self.outstanding {
            return Step::Wait;
        }
        let cursor = FrontierCursor::offset(self.next_offset);
        self.next_offset += self.page_size as u64;
        self.outstanding = true;
        Step::Next(cursor)
    }

    fn record(&mut self, cursor: &FrontierCursor, feedback: UnitFeedback) {
        self.outstanding = false;
        match feedback {
            UnitFeedback::Items(count) if count < self.page_size => {
                debug!(%cursor, count, page_size = self.page_size, "short page, listing exhausted");
                self.done = true;
            }
            UnitFeedback::Items(_) => {}
            // A skipped page says nothing about the listing's end.
            UnitFeedback::SkippedFatal => {}
        }
    }

    fn resume(&mut self, checkpoint: Option<&Checkpoint>) -> Result<(), FrontierError> {
        self.outstanding = false;
        self.done = false;
        match checkpoint.map(|cp| &cp.cursor) {
            Some(FrontierCursor::Offset { offset }) => {
                self.next_offset = offset + self.page_size as u64;
            }
            Some(other) => {
                return Err(FrontierError::CursorModeMismatch {
                    cursor: other.clone(),
                });
            }
            None => self.next_offset = self.origin,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn take(frontier: &mut PaginatedFrontier) -> FrontierCursor {
        match frontier.advance() {
            Step::Next(c) => c,
            other => panic!("expected a cursor, got {other:?}"),
        }
    }

    #[test]
    fn offsets_advance_by_page_size() {
        let mut f = PaginatedFrontier::new(40);
        let first = take(&mut f);
        assert_eq!(first, FrontierCursor::offset(0));
        f.record(&first, UnitFeedback::Items(40));
        let second = take(&mut f);
        assert_eq!(second, FrontierCursor::offset(40));
    }

    #[test]
    fn only_one_page_outstanding() {
        let mut f = PaginatedFrontier::new(40);
        let first = take(&mut f);
        assert_eq!(f.advance(), Step::Wait);
        assert_eq!(f.advance(), Step::Wait);
        f.record(&first, UnitFeedback::Items(40));
        assert!(matches!(f.advance(), Step::Next(_)));
    }

    #[test]
    fn short_page_terminates_without_issuing_next() {
        let mut f = PaginatedFrontier::new(40);
        let first = take(&mut f);
        f.record(&first, UnitFeedback::Items(39));
        assert_eq!(f.advance(), Step::Done);
        assert_eq!(f.current(), None);
    }

    #[test]
    fn full_page_keeps_listing_open() {
        let mut f = PaginatedFrontier::new(40);
        let first = take(&mut f);
        f.record(&first, UnitFeedback::Items(40));
        assert_ne!(f.advance(), Step::Done);
    }

    #[test]
    fn zero_items_is_a_short_page() {
        let mut f = PaginatedFrontier::new(40);
        let first = take(&mut f);
        f.record(&first, UnitFeedback::Items(0));
        assert_eq!(f.advance(), Step::Done);
    }

    #[test]
    fn fatal_skip_does_not_end_listing() {
        let mut f = PaginatedFrontier::new(40);
        let first = take(&mut f);
        f.record(&first, UnitFeedback::SkippedFatal);
        let second = take(&mut f);
        assert_eq!(second, FrontierCursor::offset(40));
    }

    #[test]
    fn resume_starts_after_checkpointed_page() {
        let cp = Checkpoint::new(FrontierCursor::offset(80), Utc::now());
        let mut f = PaginatedFrontier::new(40);
        f.resume(Some(&cp)).unwrap();
        assert_eq!(take(&mut f), FrontierCursor::offset(120));
    }

    #[test]
    fn resume_without_checkpoint_uses_origin() {
        let mut f = PaginatedFrontier::starting_at(40, 200);
        f.resume(None).unwrap();
        assert_eq!(take(&mut f), FrontierCursor::offset(200));
    }

    #[test]
    fn resume_rejects_calendar_checkpoint() {
        let cp = Checkpoint::new(FrontierCursor::month(2021, 5), Utc::now());
        let mut f = PaginatedFrontier::new(40);
        let err = f.resume(Some(&cp)).unwrap_err();
        assert!(matches!(err, FrontierError::CursorModeMismatch { .. }));
    }
}
