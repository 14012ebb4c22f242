use crate::application::block_store::{BlockStore, ClearReport};
use crate::application::planner_data::{
    load_assignments_or_empty, load_break_activities_or_empty, load_settings_or_default,
};
use crate::application::scheduler::{
    auto_schedule_assignments, effective_due_date, BatchReport, SchedulerContext,
};
use crate::domain::models::{
    truncate_seconds, AssignmentId, BlockId, BlockKind, BlockType, CalendarBlock, NewBlock,
};
use crate::domain::time_grid::{
    calendar_start, month_start, shift_month, week_start, TimeGrid, MONTH_GRID_DAYS,
};
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_api::PlannerApi;
use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use rand::Rng;
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub const MAX_DOTS_PER_DAY: usize = 5;
const DEFAULT_STUDY_TITLE: &str = "Study";
const DEFAULT_BUSY_TITLE: &str = "Busy";

pub fn system_now_provider() -> NowProvider {
    Arc::new(|| Local::now().naive_local())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Month,
    Week,
    Day,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthCell {
    pub date: NaiveDate,
    pub in_month: bool,
    pub is_today: bool,
    pub dots: Vec<BlockKind>,
    pub overflow: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOccupant {
    pub block_id: BlockId,
    pub kind: BlockKind,
    /// True on the first row the block covers on this day.
    pub is_start: bool,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRow {
    pub row: usize,
    pub label: String,
    pub occupant: Option<RowOccupant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGrid {
    pub date: NaiveDate,
    pub rows: Vec<DayRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekGrid {
    pub start: NaiveDate,
    pub days: Vec<DayGrid>,
}

/// A finished drag over contiguous rows of one day, normalized so `first_row <= last_row`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSelection {
    pub date: NaiveDate,
    pub first_row: usize,
    pub last_row: usize,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, Copy)]
struct DragState {
    date: NaiveDate,
    anchor_row: usize,
    current_row: usize,
}

/// What the confirmation step collects before a manual block is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualBlockRequest {
    pub title: String,
    pub block_type: BlockType,
    pub assignment_id: Option<AssignmentId>,
}

impl ManualBlockRequest {
    pub fn into_new_block(self, start: NaiveDateTime, end: NaiveDateTime) -> NewBlock {
        let title = self.title.trim();
        match self.block_type {
            BlockType::Study => {
                let title = if title.is_empty() { DEFAULT_STUDY_TITLE } else { title };
                match self.assignment_id {
                    Some(assignment_id) => NewBlock::study(title, start, end, assignment_id),
                    None => NewBlock {
                        title: title.to_string(),
                        start: truncate_seconds(start),
                        end: truncate_seconds(end),
                        block_type: BlockType::Study,
                        assignment_id: None,
                    },
                }
            }
            BlockType::Busy => {
                let title = if title.is_empty() { DEFAULT_BUSY_TITLE } else { title };
                NewBlock::busy(title, start, end)
            }
        }
    }
}

pub struct CalendarViewController<A>
where
    A: PlannerApi + 'static,
{
    store: BlockStore<A>,
    grid: TimeGrid,
    max_create_attempts_per_slot: u8,
    horizon_days: u32,
    mode: ViewMode,
    current_month: NaiveDate,
    current_day: NaiveDate,
    drag: Option<DragState>,
    now_provider: NowProvider,
}

impl<A> CalendarViewController<A>
where
    A: PlannerApi + 'static,
{
    pub fn new(api: Arc<A>, config: &ClientConfig, now_provider: NowProvider) -> Self {
        let today = now_provider().date();
        Self {
            store: BlockStore::new(api).with_retry_policy(config.retry.clone()),
            grid: config.grid,
            max_create_attempts_per_slot: config.max_create_attempts_per_slot,
            horizon_days: config.horizon_days,
            mode: ViewMode::Month,
            current_month: month_start(today),
            current_day: today,
            drag: None,
            now_provider,
        }
    }

    pub fn store(&self) -> &BlockStore<A> {
        &self.store
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn current_month(&self) -> NaiveDate {
        self.current_month
    }

    pub fn current_day(&self) -> NaiveDate {
        self.current_day
    }

    fn today(&self) -> NaiveDate {
        (self.now_provider)().date()
    }

    /// The 42-day range behind the month grid of the month being shown, or of
    /// the month containing the current day in day and week mode.
    pub fn visible_range(&self) -> (NaiveDateTime, NaiveDateTime) {
        let anchor = match self.mode {
            ViewMode::Month => self.current_month,
            ViewMode::Week | ViewMode::Day => month_start(self.current_day),
        };
        let start = calendar_start(anchor).and_time(NaiveTime::MIN);
        (start, start + Duration::days(MONTH_GRID_DAYS))
    }

    pub async fn reload(&mut self) -> Result<usize, InfraError> {
        let (start, end) = self.visible_range();
        self.store.load_blocks(start, end).await
    }

    pub async fn show_month(&mut self, month: NaiveDate) -> Result<usize, InfraError> {
        self.mode = ViewMode::Month;
        self.current_month = month_start(month);
        self.reload().await
    }

    pub async fn next_month(&mut self) -> Result<usize, InfraError> {
        self.show_month(shift_month(self.current_month, 1)).await
    }

    pub async fn prev_month(&mut self) -> Result<usize, InfraError> {
        self.show_month(shift_month(self.current_month, -1)).await
    }

    pub async fn go_to_today(&mut self) -> Result<usize, InfraError> {
        let today = self.today();
        self.current_day = today;
        self.current_month = month_start(today);
        self.reload().await
    }

    pub async fn open_day(&mut self, date: NaiveDate) -> Result<usize, InfraError> {
        self.mode = ViewMode::Day;
        self.current_day = date;
        self.current_month = month_start(date);
        self.reload().await
    }

    pub async fn open_week(&mut self, date: NaiveDate) -> Result<usize, InfraError> {
        self.mode = ViewMode::Week;
        self.current_day = date;
        self.current_month = month_start(date);
        self.reload().await
    }

    pub async fn next_day(&mut self) -> Result<usize, InfraError> {
        self.open_day(self.current_day + Duration::days(1)).await
    }

    pub async fn prev_day(&mut self) -> Result<usize, InfraError> {
        self.open_day(self.current_day - Duration::days(1)).await
    }

    pub async fn back_to_month(&mut self) -> Result<usize, InfraError> {
        self.show_month(self.current_day).await
    }

    pub fn month_grid(&self) -> Vec<MonthCell> {
        let first = calendar_start(self.current_month);
        let today = self.today();
        (0..MONTH_GRID_DAYS)
            .map(|offset| {
                let date = first + Duration::days(offset);
                let mut blocks = self.store.blocks_for_day(date);
                blocks.sort_by_key(|block| block.start);
                MonthCell {
                    date,
                    in_month: date.month() == self.current_month.month()
                        && date.year() == self.current_month.year(),
                    is_today: date == today,
                    dots: blocks
                        .iter()
                        .take(MAX_DOTS_PER_DAY)
                        .map(|block| block.kind())
                        .collect(),
                    overflow: blocks.len().saturating_sub(MAX_DOTS_PER_DAY),
                }
            })
            .collect()
    }

    pub fn day_grid(&self, date: NaiveDate) -> DayGrid {
        let mut rows = (0..self.grid.rows_per_day())
            .map(|row| DayRow {
                row,
                label: self.grid.row_label(row),
                occupant: None,
            })
            .collect::<Vec<_>>();

        let mut blocks = self.store.blocks_for_day(date);
        blocks.sort_by_key(|block| (block.start, block.end));
        for block in blocks {
            let Some(range) = self.grid.row_range_for_block(date, block.start, block.end) else {
                continue;
            };
            let first_row = range.start;
            for row in range {
                let slot = &mut rows[row].occupant;
                if slot.is_none() {
                    *slot = Some(RowOccupant {
                        block_id: block.id,
                        kind: block.kind(),
                        is_start: row == first_row,
                        label: block_label(block),
                    });
                }
            }
        }
        DayGrid { date, rows }
    }

    pub fn week_grid(&self) -> WeekGrid {
        let start = week_start(self.current_day);
        WeekGrid {
            start,
            days: (0..7)
                .map(|offset| self.day_grid(start + Duration::days(offset)))
                .collect(),
        }
    }

    pub fn begin_selection(&mut self, date: NaiveDate, row: usize) {
        self.drag = Some(DragState {
            date,
            anchor_row: row,
            current_row: row,
        });
    }

    pub fn extend_selection(&mut self, row: usize) {
        if let Some(drag) = self.drag.as_mut() {
            drag.current_row = row;
        }
    }

    pub fn cancel_selection(&mut self) {
        self.drag = None;
    }

    pub fn finish_selection(&mut self) -> Result<RowSelection, InfraError> {
        let drag = self
            .drag
            .take()
            .ok_or_else(|| InfraError::InvalidInput("no row selection in progress".to_string()))?;
        self.select_rows(drag.date, drag.anchor_row, drag.current_row)
    }

    /// Selection over rows `from..=to` in either order.
    pub fn select_rows(
        &self,
        date: NaiveDate,
        from: usize,
        to: usize,
    ) -> Result<RowSelection, InfraError> {
        let (start, end) = self
            .grid
            .selection_times(date, from, to)
            .map_err(InfraError::InvalidInput)?;
        Ok(RowSelection {
            date,
            first_row: from.min(to),
            last_row: from.max(to),
            start,
            end,
        })
    }

    pub async fn create_from_selection(
        &mut self,
        selection: &RowSelection,
        request: ManualBlockRequest,
    ) -> Result<BlockId, InfraError> {
        let payload = request.into_new_block(selection.start, selection.end);
        let block_id = self.store.create_block(payload).await?;
        self.reload_after_mutation().await;
        Ok(block_id)
    }

    pub async fn delete_block(&mut self, block_id: BlockId) -> Result<(), InfraError> {
        self.store.delete_block(block_id).await?;
        self.reload_after_mutation().await;
        Ok(())
    }

    pub async fn clear_calendar(&mut self) -> ClearReport {
        self.store.clear_calendar().await
    }

    async fn reload_after_mutation(&mut self) {
        if let Err(error) = self.reload().await {
            tracing::warn!(%error, "reload after calendar change failed");
        }
    }

    /// Runs the batch scheduler over the backend's incomplete assignments. Backend
    /// reads that fail fall back to defaults; the view is reloaded afterwards.
    pub async fn auto_schedule<R: Rng>(&mut self, rng: R) -> BatchReport {
        let now = (self.now_provider)();
        let retry_policy = self.store.retry_policy().clone();
        let api = Arc::clone(self.store.api());
        let settings = load_settings_or_default(api.as_ref(), &retry_policy).await;
        let assignments = load_assignments_or_empty(api.as_ref(), &retry_policy).await;
        let break_activities = load_break_activities_or_empty(api.as_ref(), &retry_policy).await;

        let range_start = calendar_start(self.current_month)
            .min(now.date())
            .and_time(NaiveTime::MIN);
        let horizon_end = (now.date() + Duration::days(i64::from(self.horizon_days) + 1))
            .and_time(NaiveTime::MIN);
        // Sessions run up to each assignment's due date, and one that starts just
        // before it may end after it, so the mirror covers the whole following day.
        let due_end = assignments
            .iter()
            .map(|assignment| effective_due_date(assignment.due_date, now))
            .max()
            .map(|due| (due.date() + Duration::days(1)).and_time(NaiveTime::MIN));
        let grid_end = calendar_start(self.current_month).and_time(NaiveTime::MIN)
            + Duration::days(MONTH_GRID_DAYS);
        let range_end = grid_end.max(horizon_end).max(due_end.unwrap_or(horizon_end));
        tracing::debug!(%range_start, %range_end, "loading blocks for auto-schedule");
        if let Err(error) = self.store.load_blocks(range_start, range_end).await {
            tracing::warn!(%error, "scheduling against an empty calendar");
        }

        let earliest_start = self.current_month.and_time(NaiveTime::MIN);
        let mut context = SchedulerContext::new(settings, self.grid, now, rng)
            .with_break_activities(break_activities)
            .with_earliest_start(Some(earliest_start))
            .with_max_create_attempts_per_slot(self.max_create_attempts_per_slot);
        let report = auto_schedule_assignments(&mut self.store, &assignments, &mut context).await;

        self.reload_after_mutation().await;
        report
    }
}

fn block_label(block: &CalendarBlock) -> String {
    format!(
        "{} ({}-{})",
        block.title,
        block.start.format("%H:%M"),
        block.end.format("%H:%M")
    )
}
