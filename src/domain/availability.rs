use crate::domain::models::CalendarBlock;
use chrono::{Duration, NaiveDateTime};

/// Half-open overlap test; intervals that only touch at an endpoint do not overlap.
pub fn overlaps(
    start: NaiveDateTime,
    end: NaiveDateTime,
    other_start: NaiveDateTime,
    other_end: NaiveDateTime,
) -> bool {
    start < other_end && end > other_start
}

pub fn is_slot_available(
    candidate_start: NaiveDateTime,
    duration_minutes: i64,
    existing_blocks: &[CalendarBlock],
) -> bool {
    let candidate_end = candidate_start + Duration::minutes(duration_minutes);
    !existing_blocks
        .iter()
        .any(|block| overlaps(candidate_start, candidate_end, block.start, block.end))
}

/// First pair of blocks that double-book the same time, if any.
pub fn find_overlapping_pair(blocks: &[CalendarBlock]) -> Option<(&CalendarBlock, &CalendarBlock)> {
    let mut sorted = blocks.iter().collect::<Vec<_>>();
    sorted.sort_by_key(|block| (block.start, block.end));

    // Compare against the block reaching furthest so far, not just the neighbour.
    let mut furthest: Option<&CalendarBlock> = None;
    for block in sorted {
        if let Some(previous) = furthest {
            if block.start < previous.end {
                return Some((previous, block));
            }
        }
        if furthest.is_none_or(|previous| block.end > previous.end) {
            furthest = Some(block);
        }
    }
    None
}
