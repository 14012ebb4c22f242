use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::ops::Range;

pub const DEFAULT_DAY_START_HOUR: u32 = 6;
pub const DEFAULT_DAY_END_HOUR: u32 = 22;
pub const DEFAULT_SLOT_MINUTES: u32 = 30;
pub const MONTH_GRID_DAYS: i64 = 42;

/// Working hours split into fixed-size rows. Pure coordinate math, no I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeGrid {
    day_start_hour: u32,
    day_end_hour: u32,
    slot_minutes: u32,
}

impl Default for TimeGrid {
    fn default() -> Self {
        Self {
            day_start_hour: DEFAULT_DAY_START_HOUR,
            day_end_hour: DEFAULT_DAY_END_HOUR,
            slot_minutes: DEFAULT_SLOT_MINUTES,
        }
    }
}

impl TimeGrid {
    pub fn new(day_start_hour: u32, day_end_hour: u32, slot_minutes: u32) -> Result<Self, String> {
        if day_end_hour > 24 {
            return Err("grid.day_end_hour must be <= 24".to_string());
        }
        if day_end_hour <= day_start_hour {
            return Err("grid.day_end_hour must be after grid.day_start_hour".to_string());
        }
        if slot_minutes == 0 {
            return Err("grid.slot_minutes must be > 0".to_string());
        }
        let span = (day_end_hour - day_start_hour) * 60;
        if span % slot_minutes != 0 {
            return Err(format!(
                "grid.slot_minutes ({slot_minutes}) must evenly divide the {span} minute day"
            ));
        }
        Ok(Self {
            day_start_hour,
            day_end_hour,
            slot_minutes,
        })
    }

    pub fn day_start_hour(&self) -> u32 {
        self.day_start_hour
    }

    pub fn day_end_hour(&self) -> u32 {
        self.day_end_hour
    }

    pub fn slot_minutes(&self) -> u32 {
        self.slot_minutes
    }

    pub fn slot(&self) -> Duration {
        Duration::minutes(i64::from(self.slot_minutes))
    }

    pub fn rows_per_day(&self) -> usize {
        ((self.day_end_hour - self.day_start_hour) * 60 / self.slot_minutes) as usize
    }

    pub fn row_to_minutes(&self, row: usize) -> i64 {
        i64::from(self.day_start_hour) * 60 + row as i64 * i64::from(self.slot_minutes)
    }

    /// Rounds to the nearest row; results outside the grid are not clamped.
    pub fn minutes_to_row(&self, minutes: i64) -> i64 {
        let offset = (minutes - i64::from(self.day_start_hour) * 60) as f64;
        (offset / f64::from(self.slot_minutes)).round() as i64
    }

    pub fn row_label(&self, row: usize) -> String {
        minutes_to_hm(self.row_to_minutes(row))
    }

    /// Wall-clock interval covered by rows `first..=last` on `date`, in either order.
    pub fn selection_times(
        &self,
        date: NaiveDate,
        first: usize,
        last: usize,
    ) -> Result<(NaiveDateTime, NaiveDateTime), String> {
        let (low, high) = if first <= last { (first, last) } else { (last, first) };
        if high >= self.rows_per_day() {
            return Err(format!(
                "row {high} is outside the {} row grid",
                self.rows_per_day()
            ));
        }
        let midnight = date.and_time(NaiveTime::MIN);
        Ok((
            midnight + Duration::minutes(self.row_to_minutes(low)),
            midnight + Duration::minutes(self.row_to_minutes(high + 1)),
        ))
    }

    /// Rows a block covers on `date`. A block that started the day before or
    /// ends after midnight is clipped to the part that falls on `date`.
    pub fn row_range_for_block(
        &self,
        date: NaiveDate,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Option<Range<usize>> {
        let day_begin = date.and_time(NaiveTime::MIN);
        let day_end = day_begin + Duration::days(1);
        if end <= day_begin || start >= day_end || end <= start {
            return None;
        }
        let start_minutes = if start < day_begin {
            0
        } else {
            minutes_since_midnight(start)
        };
        let end_minutes = if end >= day_end {
            24 * 60
        } else {
            minutes_since_midnight(end)
        };

        // Any row the block touches counts, so short blocks keep at least one row.
        let grid_start = i64::from(self.day_start_hour) * 60;
        let slot = i64::from(self.slot_minutes);
        let total_rows = self.rows_per_day() as i64;
        let start_row = (start_minutes - grid_start).div_euclid(slot).max(0);
        let end_row = -(grid_start - end_minutes).div_euclid(slot);
        let end_row = end_row.min(total_rows);
        (end_row > start_row).then(|| start_row as usize..end_row as usize)
    }

    pub fn day_start(&self, date: NaiveDate) -> NaiveDateTime {
        at_hour(date, self.day_start_hour)
    }

    pub fn day_end(&self, date: NaiveDate) -> NaiveDateTime {
        at_hour(date, self.day_end_hour)
    }

    /// Next slot boundary at or after `value`, counted from midnight.
    pub fn ceil_to_slot(&self, value: NaiveDateTime) -> NaiveDateTime {
        let midnight = value.date().and_time(NaiveTime::MIN);
        let elapsed = (value - midnight).num_seconds();
        let slot_seconds = i64::from(self.slot_minutes) * 60;
        let rounded = (elapsed + slot_seconds - 1) / slot_seconds * slot_seconds;
        midnight + Duration::seconds(rounded)
    }
}

pub fn at_hour(date: NaiveDate, hour: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(hour))
}

pub fn minutes_since_midnight(value: NaiveDateTime) -> i64 {
    i64::from(value.hour()) * 60 + i64::from(value.minute())
}

pub fn minutes_to_hm(minutes: i64) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Sunday on or before the first of the month containing `date`.
pub fn calendar_start(date: NaiveDate) -> NaiveDate {
    let first = month_start(date);
    first - Duration::days(i64::from(first.weekday().num_days_from_sunday()))
}

/// Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

pub fn shift_month(date: NaiveDate, months: i32) -> NaiveDate {
    let first = month_start(date);
    let index = first.year() * 12 + first.month0() as i32 + months;
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").expect("valid datetime")
    }

    #[test]
    fn default_grid_has_thirty_two_rows() {
        let grid = TimeGrid::default();
        assert_eq!(grid.rows_per_day(), 32);
        assert_eq!(grid.row_to_minutes(0), 360);
        assert_eq!(grid.row_label(31), "21:30");
    }

    #[test]
    fn new_rejects_slot_that_does_not_divide_span() {
        assert!(TimeGrid::new(6, 22, 45).is_err());
        assert!(TimeGrid::new(10, 10, 30).is_err());
        assert!(TimeGrid::new(6, 25, 30).is_err());
        assert!(TimeGrid::new(8, 20, 15).is_ok());
    }

    #[test]
    fn selection_times_normalizes_reverse_drag() {
        let grid = TimeGrid::default();
        let (start, end) = grid
            .selection_times(date("2026-02-16"), 7, 6)
            .expect("valid rows");
        assert_eq!(start, at("2026-02-16T09:00:00"));
        assert_eq!(end, at("2026-02-16T10:00:00"));
        assert!(grid.selection_times(date("2026-02-16"), 0, 32).is_err());
    }

    #[test]
    fn block_straddling_midnight_is_clipped_per_day() {
        let grid = TimeGrid::new(0, 24, 30).expect("full day grid");
        let start = at("2026-02-16T23:00:00");
        let end = at("2026-02-17T01:00:00");
        assert_eq!(grid.row_range_for_block(date("2026-02-16"), start, end), Some(46..48));
        assert_eq!(grid.row_range_for_block(date("2026-02-17"), start, end), Some(0..2));
        assert_eq!(grid.row_range_for_block(date("2026-02-18"), start, end), None);
    }

    #[test]
    fn block_outside_working_hours_has_no_rows() {
        let grid = TimeGrid::default();
        let day = date("2026-02-16");
        assert_eq!(
            grid.row_range_for_block(day, at("2026-02-16T05:00:00"), at("2026-02-16T06:00:00")),
            None
        );
        assert_eq!(
            grid.row_range_for_block(day, at("2026-02-16T21:30:00"), at("2026-02-16T23:30:00")),
            Some(31..32)
        );
    }

    #[test]
    fn short_block_inside_one_slot_keeps_its_row() {
        let grid = TimeGrid::default();
        let day = date("2026-02-16");
        assert_eq!(
            grid.row_range_for_block(day, at("2026-02-16T09:05:00"), at("2026-02-16T09:10:00")),
            Some(6..7)
        );
        assert_eq!(
            grid.row_range_for_block(day, at("2026-02-16T09:20:00"), at("2026-02-16T09:40:00")),
            Some(6..8)
        );
        assert_eq!(
            grid.row_range_for_block(day, at("2026-02-16T09:00:00"), at("2026-02-16T09:25:00")),
            Some(6..7)
        );
    }

    #[test]
    fn ceil_to_slot_rounds_up_and_drops_seconds() {
        let grid = TimeGrid::default();
        assert_eq!(grid.ceil_to_slot(at("2026-02-16T09:00:00")), at("2026-02-16T09:00:00"));
        assert_eq!(grid.ceil_to_slot(at("2026-02-16T09:00:01")), at("2026-02-16T09:30:00"));
        assert_eq!(grid.ceil_to_slot(at("2026-02-16T23:45:00")), at("2026-02-17T00:00:00"));
    }

    #[test]
    fn month_helpers() {
        // February 2026 starts on a Sunday.
        assert_eq!(calendar_start(date("2026-02-18")), date("2026-02-01"));
        assert_eq!(calendar_start(date("2026-10-16")), date("2026-09-27"));
        assert_eq!(week_start(date("2026-10-16")), date("2026-10-11"));
        assert_eq!(shift_month(date("2026-12-31"), 1), date("2027-01-01"));
        assert_eq!(shift_month(date("2026-01-15"), -1), date("2025-12-01"));
    }

    proptest! {
        #[test]
        fn row_minutes_round_trip(
            start in 0u32..12,
            span in 1u32..12,
            slot_index in 0usize..4,
            row_seed in 0usize..1000,
        ) {
            let slot = [10u32, 15, 30, 60][slot_index];
            let grid = TimeGrid::new(start, start + span, slot).expect("valid grid");
            let row = row_seed % grid.rows_per_day();
            prop_assert_eq!(grid.minutes_to_row(grid.row_to_minutes(row)), row as i64);
        }
    }
}
