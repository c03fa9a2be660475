//! Property tests for frontier traversal: offsets stay on the page grid,
//! calendar cursors stay valid and strictly increase, resume never replays a
//! completed unit.

mod common;

use chrono::Utc;
use proptest::prelude::*;

use tideline::checkpoint::Checkpoint;
use tideline::frontier::{
    CalendarFrontier, Frontier, FrontierCursor, PaginatedFrontier, Step, StopRule, UnitFeedback,
};

proptest! {
    #[test]
    fn paginated_offsets_stay_on_the_grid(
        page_size in 1usize..500,
        pages in 1usize..60,
    ) {
        let mut frontier = PaginatedFrontier::new(page_size);
        for k in 0..pages {
            let Step::Next(cursor) = frontier.advance() else {
                panic!("frontier closed early");
            };
            prop_assert_eq!(cursor.clone(), FrontierCursor::offset((k * page_size) as u64));
            frontier.record(&cursor, UnitFeedback::Items(page_size));
        }
    }

    #[test]
    fn paginated_resume_issues_strictly_later_offsets(
        page_size in 1usize..500,
        checkpointed in 0u64..100_000,
    ) {
        let cp = Checkpoint::new(FrontierCursor::offset(checkpointed), Utc::now());
        let mut frontier = PaginatedFrontier::new(page_size);
        frontier.resume(Some(&cp)).unwrap();
        let Step::Next(cursor) = frontier.advance() else {
            panic!("frontier closed after resume");
        };
        prop_assert!(cursor > cp.cursor);
    }

    #[test]
    fn calendar_months_stay_in_range_and_increase(
        year in 1990i32..2100,
        month in 1u32..=12,
        steps in 1usize..200,
    ) {
        let mut frontier =
            CalendarFrontier::new(year, month, StopRule::EmptyStreak(u32::MAX)).unwrap();
        let mut previous: Option<FrontierCursor> = None;
        for _ in 0..steps {
            let Step::Next(cursor) = frontier.advance() else {
                panic!("empty-streak frontier ended without feedback");
            };
            let FrontierCursor::Month { month: m, .. } = &cursor else {
                panic!("calendar frontier issued a non-month cursor");
            };
            prop_assert!((1..=12).contains(m));
            if let Some(prev) = previous {
                prop_assert!(cursor > prev);
            }
            previous = Some(cursor);
        }
    }

    #[test]
    fn december_always_wraps_to_january(year in 1990i32..2100) {
        let mut frontier =
            CalendarFrontier::new(year, 12, StopRule::Until { year: year + 1, month: 6 }).unwrap();
        let Step::Next(first) = frontier.advance() else { panic!() };
        let Step::Next(second) = frontier.advance() else { panic!() };
        prop_assert_eq!(first, FrontierCursor::month(year, 12));
        prop_assert_eq!(second, FrontierCursor::month(year + 1, 1));
    }

    #[test]
    fn calendar_resume_issues_the_following_month(
        year in 1990i32..2100,
        month in 1u32..=12,
    ) {
        let cp = Checkpoint::new(FrontierCursor::month(year, month), Utc::now());
        let mut frontier =
            CalendarFrontier::new(1970, 1, StopRule::EmptyStreak(u32::MAX)).unwrap();
        frontier.resume(Some(&cp)).unwrap();
        let Step::Next(cursor) = frontier.advance() else { panic!() };
        let expected = if month == 12 {
            FrontierCursor::month(year + 1, 1)
        } else {
            FrontierCursor::month(year, month + 1)
        };
        prop_assert_eq!(cursor, expected);
    }
}
