use crate::application::block_store::BlockStore;
use crate::domain::availability::is_slot_available;
use crate::domain::models::{
    ActivityType, Assignment, AssignmentId, BlockId, BreakActivity, NewBlock, Pacing, Settings,
};
use crate::domain::time_grid::{at_hour, TimeGrid};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_api::PlannerApi;
use chrono::{Duration, NaiveDateTime};
use rand::Rng;
use rand::seq::IndexedRandom;

/// A trailing remainder shorter than this is folded into the preceding session.
pub const MIN_SESSION_MINUTES: i64 = 10;
pub const DEFAULT_LONG_BREAK_TITLE: &str = "Break";
pub const DEFAULT_SHORT_BREAK_TITLE: &str = "Short Break";

const FALLBACK_DUE_DAYS: i64 = 7;
const MAX_PLANNING_DAYS: i64 = 14;
const MIN_SESSIONS_PER_DAY: i64 = 2;
const MAX_SESSIONS_PER_DAY: i64 = 4;
const PREFERRED_HOURS_UTILIZATION: f64 = 0.7;
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Everything one scheduling run reads besides the block store.
pub struct SchedulerContext<R: Rng> {
    pub settings: Settings,
    pub grid: TimeGrid,
    pub break_activities: Vec<BreakActivity>,
    pub now: NaiveDateTime,
    /// Sessions never start before this, e.g. the first day of the viewed month.
    pub earliest_start: Option<NaiveDateTime>,
    pub max_create_attempts_per_slot: u8,
    pub rng: R,
}

impl<R: Rng> SchedulerContext<R> {
    pub fn new(settings: Settings, grid: TimeGrid, now: NaiveDateTime, rng: R) -> Self {
        Self {
            settings,
            grid,
            break_activities: Vec::new(),
            now,
            earliest_start: None,
            max_create_attempts_per_slot: 3,
            rng,
        }
    }

    pub fn with_break_activities(mut self, break_activities: Vec<BreakActivity>) -> Self {
        self.break_activities = break_activities;
        self
    }

    pub fn with_earliest_start(mut self, earliest_start: Option<NaiveDateTime>) -> Self {
        self.earliest_start = earliest_start;
        self
    }

    pub fn with_max_create_attempts_per_slot(mut self, attempts: u8) -> Self {
        self.max_create_attempts_per_slot = attempts.max(1);
        self
    }

    fn pacing(&self) -> Pacing {
        self.settings
            .pacing(self.grid.day_start_hour(), self.grid.day_end_hour())
    }

    fn start_cursor(&self) -> NaiveDateTime {
        let start = match self.earliest_start {
            Some(earliest) if earliest > self.now => earliest,
            _ => self.now,
        };
        self.grid.ceil_to_slot(start)
    }
}

/// Length of the next session given what is left to place.
pub fn session_minutes(remaining_minutes: i64, work_interval: i64) -> i64 {
    if remaining_minutes <= work_interval {
        return remaining_minutes;
    }
    let fold_threshold = MIN_SESSION_MINUTES.min(work_interval / 2);
    if remaining_minutes - work_interval < fold_threshold {
        remaining_minutes
    } else {
        work_interval
    }
}

/// The due date placement works toward. Missing or past due dates become a week from now.
pub fn effective_due_date(due_date: Option<NaiveDateTime>, now: NaiveDateTime) -> NaiveDateTime {
    match due_date {
        Some(due) if due > now => due,
        _ => now + Duration::days(FALLBACK_DUE_DAYS),
    }
}

/// Per-assignment numbers fixed before the placement loop starts.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentPlan {
    pub total_minutes: i64,
    pub effective_due: NaiveDateTime,
    pub days_available: i64,
    pub days_to_use: i64,
    pub total_sessions: i64,
    pub ideal_sessions_per_day: i64,
    pub can_fit_in_preferred_hours: bool,
}

impl AssignmentPlan {
    pub fn new(
        assignment: &Assignment,
        already_scheduled_minutes: i64,
        pacing: &Pacing,
        now: NaiveDateTime,
    ) -> Self {
        let total_minutes = (assignment.estimated_time - already_scheduled_minutes).max(0);
        let effective_due = effective_due_date(assignment.due_date, now);

        let seconds_left = (effective_due - now).num_seconds();
        let days_available = ((seconds_left + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY).max(1);
        let days_to_use = days_available.clamp(1, MAX_PLANNING_DAYS);

        let work_interval = i64::from(pacing.work_interval);
        let mut total_sessions = 0;
        let mut left = total_minutes;
        while left > 0 {
            left -= session_minutes(left, work_interval);
            total_sessions += 1;
        }

        let per_day = (total_sessions + days_to_use - 1) / days_to_use;
        let ideal_sessions_per_day = per_day.clamp(MIN_SESSIONS_PER_DAY, MAX_SESSIONS_PER_DAY);

        let preferred_minutes_per_day =
            i64::from(pacing.preferred_end_hour - pacing.preferred_start_hour) * 60;
        let preferred_capacity =
            preferred_minutes_per_day as f64 * days_available as f64 * PREFERRED_HOURS_UTILIZATION;
        let can_fit_in_preferred_hours = total_minutes as f64 <= preferred_capacity;

        Self {
            total_minutes,
            effective_due,
            days_available,
            days_to_use,
            total_sessions,
            ideal_sessions_per_day,
            can_fit_in_preferred_hours,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentReport {
    pub assignment_id: AssignmentId,
    pub name: String,
    pub requested_minutes: i64,
    pub scheduled_minutes: i64,
    pub study_block_ids: Vec<BlockId>,
    pub break_block_ids: Vec<BlockId>,
    pub failed_attempts: usize,
    pub effective_due: NaiveDateTime,
}

impl AssignmentReport {
    pub fn remaining_minutes(&self) -> i64 {
        (self.requested_minutes - self.scheduled_minutes).max(0)
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_minutes() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub scheduled: Vec<AssignmentReport>,
    pub skipped_already_scheduled: Vec<AssignmentId>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.scheduled.iter().all(AssignmentReport::is_complete)
    }

    pub fn created_block_count(&self) -> usize {
        self.scheduled
            .iter()
            .map(|report| report.study_block_ids.len() + report.break_block_ids.len())
            .sum()
    }

    pub fn summary(&self) -> String {
        if self.scheduled.is_empty() {
            return "All assignments are already scheduled!".to_string();
        }
        let incomplete = self
            .scheduled
            .iter()
            .filter(|report| !report.is_complete())
            .map(|report| format!("{} ({} min unplaced)", report.name, report.remaining_minutes()))
            .collect::<Vec<_>>();
        if incomplete.is_empty() {
            "Assignments auto-scheduled successfully!".to_string()
        } else {
            format!(
                "Auto-scheduling left work unplaced: {}",
                incomplete.join(", ")
            )
        }
    }
}

enum PlacementOutcome {
    Placed(BlockId),
    Retryable(InfraError),
    Terminal(InfraError),
}

async fn place<A>(store: &mut BlockStore<A>, payload: NewBlock) -> PlacementOutcome
where
    A: PlannerApi + 'static,
{
    match store.create_block(payload).await {
        Ok(block_id) => PlacementOutcome::Placed(block_id),
        Err(error) if error.is_retryable() => PlacementOutcome::Retryable(error),
        Err(error) => PlacementOutcome::Terminal(error),
    }
}

pub fn pick_break_title<R: Rng + ?Sized>(
    activities: &[BreakActivity],
    activity_type: ActivityType,
    rng: &mut R,
) -> String {
    let candidates = activities
        .iter()
        .filter(|activity| activity.activity_type == activity_type)
        .collect::<Vec<_>>();
    match candidates.choose(rng) {
        Some(activity) => activity.name.clone(),
        None => match activity_type {
            ActivityType::Long => DEFAULT_LONG_BREAK_TITLE.to_string(),
            ActivityType::Short => DEFAULT_SHORT_BREAK_TITLE.to_string(),
        },
    }
}

/// Schedules every incomplete assignment that has no study block yet, in the
/// order given. Assignments with any study block are skipped, not topped up.
pub async fn auto_schedule_assignments<A, R>(
    store: &mut BlockStore<A>,
    assignments: &[Assignment],
    context: &mut SchedulerContext<R>,
) -> BatchReport
where
    A: PlannerApi + 'static,
    R: Rng,
{
    let mut report = BatchReport::default();
    for assignment in assignments.iter().filter(|assignment| !assignment.completed) {
        if store.has_study_block(assignment.id) {
            report.skipped_already_scheduled.push(assignment.id);
            continue;
        }
        let assignment_report = schedule_assignment(store, assignment, context).await;
        report.scheduled.push(assignment_report);
    }

    tracing::info!(
        scheduled = report.scheduled.len(),
        skipped = report.skipped_already_scheduled.len(),
        created_blocks = report.created_block_count(),
        complete = report.is_complete(),
        "auto-schedule run finished"
    );
    report
}

/// Greedy placement of one assignment's sessions and breaks, moving a cursor
/// forward from now until the work is placed or the due date is reached.
pub async fn schedule_assignment<A, R>(
    store: &mut BlockStore<A>,
    assignment: &Assignment,
    context: &mut SchedulerContext<R>,
) -> AssignmentReport
where
    A: PlannerApi + 'static,
    R: Rng,
{
    let pacing = context.pacing();
    let grid = context.grid;
    let slot = grid.slot();
    let plan = AssignmentPlan::new(
        assignment,
        store.scheduled_minutes_for(assignment.id),
        &pacing,
        context.now,
    );
    let mut report = AssignmentReport {
        assignment_id: assignment.id,
        name: assignment.name.clone(),
        requested_minutes: plan.total_minutes,
        scheduled_minutes: 0,
        study_block_ids: Vec::new(),
        break_block_ids: Vec::new(),
        failed_attempts: 0,
        effective_due: plan.effective_due,
    };
    tracing::debug!(assignment_id = assignment.id, ?plan, "planning assignment");

    let next_day_start = |cursor: NaiveDateTime| {
        at_hour(cursor.date() + Duration::days(1), pacing.preferred_start_hour)
    };

    let work_interval = i64::from(pacing.work_interval);
    let cadence = pacing.cadence.max(1);
    let mut cursor = context.start_cursor();
    let mut remaining = plan.total_minutes;
    let mut session_count: u32 = 0;
    let mut sessions_today: i64 = 0;
    let mut attempts_at_cursor: u8 = 0;

    while remaining > 0 && cursor < plan.effective_due {
        if sessions_today >= plan.ideal_sessions_per_day {
            cursor = next_day_start(cursor);
            sessions_today = 0;
            continue;
        }

        let date = cursor.date();
        let preferred_start = at_hour(date, pacing.preferred_start_hour);
        let preferred_end = at_hour(date, pacing.preferred_end_hour);
        let global_end = grid.day_end(date);

        if cursor < preferred_start {
            cursor = preferred_start;
        }
        if cursor >= preferred_end {
            let urgent = !plan.can_fit_in_preferred_hours && cursor < global_end;
            if !urgent {
                cursor = next_day_start(cursor);
                sessions_today = 0;
                continue;
            }
        }
        if cursor >= global_end {
            cursor = next_day_start(cursor);
            sessions_today = 0;
            continue;
        }

        let session = session_minutes(remaining, work_interval);
        let session_end = cursor + Duration::minutes(session);
        let day_limit = if plan.can_fit_in_preferred_hours {
            preferred_end
        } else {
            global_end
        };
        if session_end > day_limit {
            cursor = next_day_start(cursor);
            sessions_today = 0;
            continue;
        }

        if !is_slot_available(cursor, session, store.blocks()) {
            cursor += slot;
            attempts_at_cursor = 0;
            if cursor >= global_end - slot {
                cursor = next_day_start(cursor);
                sessions_today = 0;
            }
            continue;
        }

        let payload = NewBlock::study(&assignment.name, cursor, session_end, assignment.id);
        match place(store, payload).await {
            PlacementOutcome::Placed(block_id) => {
                attempts_at_cursor = 0;
                report.study_block_ids.push(block_id);
                report.scheduled_minutes += session;
            }
            PlacementOutcome::Retryable(error)
                if attempts_at_cursor + 1 < context.max_create_attempts_per_slot =>
            {
                attempts_at_cursor += 1;
                report.failed_attempts += 1;
                tracing::debug!(
                    %error,
                    %cursor,
                    attempt = attempts_at_cursor,
                    "retrying session slot"
                );
                continue;
            }
            PlacementOutcome::Retryable(error) | PlacementOutcome::Terminal(error) => {
                attempts_at_cursor = 0;
                report.failed_attempts += 1;
                tracing::warn!(
                    %error,
                    %cursor,
                    assignment_id = assignment.id,
                    "giving up on session slot"
                );
                cursor += slot;
                continue;
            }
        }

        remaining -= session;
        session_count += 1;
        sessions_today += 1;
        cursor = session_end;

        if remaining <= 0 {
            break;
        }

        let (break_type, break_minutes) = if session_count % cadence == 0 {
            (ActivityType::Long, pacing.long_break)
        } else {
            (ActivityType::Short, pacing.short_break)
        };
        let break_minutes = i64::from(break_minutes);
        let break_end = cursor + Duration::minutes(break_minutes);
        if break_end >= global_end {
            cursor = next_day_start(cursor);
            sessions_today = 0;
            continue;
        }
        if !is_slot_available(cursor, break_minutes, store.blocks()) {
            // Something else already occupies the gap; the next session search skips past it.
            tracing::debug!(%cursor, "break slot occupied, not creating break block");
            continue;
        }

        let title = pick_break_title(&context.break_activities, break_type, &mut context.rng);
        match store.create_block(NewBlock::busy(&title, cursor, break_end)).await {
            Ok(block_id) => report.break_block_ids.push(block_id),
            Err(_) => report.failed_attempts += 1,
        }
        cursor = break_end;
    }

    if report.is_complete() {
        tracing::info!(
            assignment_id = assignment.id,
            sessions = report.study_block_ids.len(),
            "assignment fully scheduled"
        );
    } else {
        tracing::warn!(
            assignment_id = assignment.id,
            name = %assignment.name,
            remaining_minutes = report.remaining_minutes(),
            due = %plan.effective_due,
            "assignment only partially scheduled before its due date"
        );
    }
    report
}
