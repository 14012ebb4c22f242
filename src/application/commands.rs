use crate::application::block_store::ClearReport;
use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::calendar_view::{
    system_now_provider, CalendarViewController, DayGrid, ManualBlockRequest, MonthCell,
    NowProvider, WeekGrid,
};
use crate::application::scheduler::BatchReport;
use crate::domain::models::{AssignmentId, BlockId, BlockKind, BlockType, CalendarBlock};
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_api::{PlannerApi, ReqwestPlannerApi};
use chrono::{Datelike, NaiveDate, Utc};
use rand::Rng;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

const WEEK_COLUMN_WIDTH: usize = 14;

pub struct AppState<A = ReqwestPlannerApi>
where
    A: PlannerApi + 'static,
{
    workspace_root: PathBuf,
    config_dir: PathBuf,
    logs_dir: PathBuf,
    config: ClientConfig,
    api: Arc<A>,
    now_provider: NowProvider,
    log_guard: Mutex<()>,
}

impl AppState<ReqwestPlannerApi> {
    pub fn new(workspace_root: PathBuf, base_url: Option<String>) -> Result<Self, InfraError> {
        let mut bootstrap = bootstrap_workspace(&workspace_root)?;
        if let Some(base_url) = base_url
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            bootstrap.config.base_url = base_url;
        }
        let api = ReqwestPlannerApi::new(
            &bootstrap.config.base_url,
            StdDuration::from_secs(bootstrap.config.request_timeout_seconds),
        )?;
        Ok(Self::with_api(bootstrap, Arc::new(api), system_now_provider()))
    }
}

impl<A> AppState<A>
where
    A: PlannerApi + 'static,
{
    pub fn with_api(bootstrap: BootstrapResult, api: Arc<A>, now_provider: NowProvider) -> Self {
        Self {
            workspace_root: bootstrap.workspace_root,
            config_dir: bootstrap.config_dir,
            logs_dir: bootstrap.logs_dir,
            config: bootstrap.config,
            api,
            now_provider,
            log_guard: Mutex::new(()),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        (self.now_provider)().date()
    }

    pub fn controller(&self) -> CalendarViewController<A> {
        CalendarViewController::new(
            Arc::clone(&self.api),
            &self.config,
            Arc::clone(&self.now_provider),
        )
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        tracing::error!(command, %error, "command failed");
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        tracing::info!(command, "{message}");
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthView {
    pub month: NaiveDate,
    pub cells: Vec<MonthCell>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddBlockArgs {
    pub date: String,
    pub from_row: usize,
    pub to_row: usize,
    pub title: Option<String>,
    pub block_type: Option<String>,
    pub assignment_id: Option<AssignmentId>,
}

fn parse_date_arg(value: Option<&str>, fallback: NaiveDate) -> Result<NaiveDate, InfraError> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|error| InfraError::InvalidInput(format!("date must be YYYY-MM-DD: {error}"))),
        None => Ok(fallback),
    }
}

fn parse_month_arg(value: Option<&str>, fallback: NaiveDate) -> Result<NaiveDate, InfraError> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d")
            .map_err(|error| InfraError::InvalidInput(format!("month must be YYYY-MM: {error}"))),
        None => Ok(fallback),
    }
}

pub async fn month_view_impl<A>(
    state: &AppState<A>,
    month: Option<String>,
) -> Result<MonthView, InfraError>
where
    A: PlannerApi + 'static,
{
    let month = parse_month_arg(month.as_deref(), state.today())?;
    let mut controller = state.controller();
    controller.show_month(month).await?;
    Ok(MonthView {
        month: controller.current_month(),
        cells: controller.month_grid(),
    })
}

pub async fn day_view_impl<A>(
    state: &AppState<A>,
    date: Option<String>,
) -> Result<DayGrid, InfraError>
where
    A: PlannerApi + 'static,
{
    let date = parse_date_arg(date.as_deref(), state.today())?;
    let mut controller = state.controller();
    controller.open_day(date).await?;
    Ok(controller.day_grid(date))
}

pub async fn week_view_impl<A>(
    state: &AppState<A>,
    date: Option<String>,
) -> Result<WeekGrid, InfraError>
where
    A: PlannerApi + 'static,
{
    let date = parse_date_arg(date.as_deref(), state.today())?;
    let mut controller = state.controller();
    controller.open_week(date).await?;
    Ok(controller.week_grid())
}

pub async fn auto_schedule_impl<A, R>(
    state: &AppState<A>,
    rng: R,
) -> Result<BatchReport, InfraError>
where
    A: PlannerApi + 'static,
    R: Rng,
{
    let mut controller = state.controller();
    let report = controller.auto_schedule(rng).await;
    state.log_info("auto_schedule", &report.summary());
    Ok(report)
}

pub async fn add_block_impl<A>(
    state: &AppState<A>,
    args: AddBlockArgs,
) -> Result<CalendarBlock, InfraError>
where
    A: PlannerApi + 'static,
{
    let date = parse_date_arg(Some(args.date.as_str()), state.today())?;
    let block_type = match args.block_type.as_deref() {
        Some(value) => BlockType::parse(value).map_err(InfraError::InvalidInput)?,
        None => BlockType::Study,
    };

    let mut controller = state.controller();
    controller.open_day(date).await?;
    let selection = controller.select_rows(date, args.from_row, args.to_row)?;
    let request = ManualBlockRequest {
        title: args.title.unwrap_or_default(),
        block_type,
        assignment_id: args.assignment_id,
    };
    let payload = request.clone().into_new_block(selection.start, selection.end);
    let block_id = controller.create_from_selection(&selection, request).await?;

    state.log_info(
        "add_block",
        &format!("created block {block_id} {} {}", selection.start, selection.end),
    );
    Ok(CalendarBlock::from_new(block_id, &payload))
}

pub async fn delete_block_impl<A>(state: &AppState<A>, block_id: BlockId) -> Result<(), InfraError>
where
    A: PlannerApi + 'static,
{
    let mut controller = state.controller();
    controller.delete_block(block_id).await?;
    state.log_info("delete_block", &format!("deleted block {block_id}"));
    Ok(())
}

pub async fn clear_calendar_impl<A>(
    state: &AppState<A>,
    month: Option<String>,
) -> Result<ClearReport, InfraError>
where
    A: PlannerApi + 'static,
{
    let month = parse_month_arg(month.as_deref(), state.today())?;
    let mut controller = state.controller();
    controller.show_month(month).await?;
    let report = controller.clear_calendar().await;
    state.log_info(
        "clear_calendar",
        &format!("deleted {} blocks, {} failed", report.deleted, report.failed.len()),
    );
    if report.failed.is_empty() {
        Ok(report)
    } else {
        Err(InfraError::InvalidInput(format!(
            "failed to delete blocks: {}",
            report
                .failed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

fn kind_symbol(kind: BlockKind) -> char {
    match kind {
        BlockKind::Study => 's',
        BlockKind::Busy => 'x',
        BlockKind::Break => '~',
    }
}

pub fn render_month(view: &MonthView) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{}", view.month.format("%B %Y"));
    for name in ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"] {
        let _ = write!(output, "{name:<10}");
    }
    output.push('\n');

    for week in view.cells.chunks(7) {
        for cell in week {
            let marker = if cell.is_today {
                '*'
            } else if cell.in_month {
                ' '
            } else {
                '.'
            };
            let mut dots = cell.dots.iter().map(|kind| kind_symbol(*kind)).collect::<String>();
            if cell.overflow > 0 {
                let _ = write!(dots, "+{}", cell.overflow);
            }
            let _ = write!(output, "{marker}{:>2} {dots:<6}", cell.date.day());
        }
        output.push('\n');
    }
    output
}

fn row_text(grid: &DayGrid, index: usize) -> String {
    match grid.rows.get(index).and_then(|row| row.occupant.as_ref()) {
        Some(occupant) if occupant.is_start => {
            format!("[{}] {}", kind_symbol(occupant.kind), occupant.label)
        }
        Some(_) => "  |".to_string(),
        None => String::new(),
    }
}

pub fn render_day(grid: &DayGrid) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{}", grid.date.format("%A, %B %-d, %Y"));
    for (index, row) in grid.rows.iter().enumerate() {
        let _ = writeln!(output, "{} {}", row.label, row_text(grid, index));
    }
    output.lines().map(str::trim_end).collect::<Vec<_>>().join("\n") + "\n"
}

pub fn render_week(week: &WeekGrid) -> String {
    let mut output = String::new();
    let _ = write!(output, "{:<6}", "");
    for day in &week.days {
        let _ = write!(
            output,
            "{:<width$}",
            day.date.format("%a %m-%d").to_string(),
            width = WEEK_COLUMN_WIDTH
        );
    }
    output.push('\n');

    let rows = week.days.first().map(|day| day.rows.len()).unwrap_or(0);
    for index in 0..rows {
        let label = &week.days[0].rows[index].label;
        let _ = write!(output, "{label:<6}");
        for day in &week.days {
            let cell = match day.rows[index].occupant.as_ref() {
                Some(occupant) if occupant.is_start => {
                    let mut text = format!("{} {}", kind_symbol(occupant.kind), occupant.label);
                    text.truncate(
                        text.char_indices()
                            .nth(WEEK_COLUMN_WIDTH - 1)
                            .map(|(offset, _)| offset)
                            .unwrap_or(text.len()),
                    );
                    text
                }
                Some(_) => "|".to_string(),
                None => String::new(),
            };
            let _ = write!(output, "{cell:<width$}", width = WEEK_COLUMN_WIDTH);
        }
        output.push('\n');
    }
    output.lines().map(str::trim_end).collect::<Vec<_>>().join("\n") + "\n"
}

pub fn render_batch_report(report: &BatchReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{}", report.summary());
    for item in &report.scheduled {
        let _ = writeln!(
            output,
            "  {} (#{}) {}/{} min in {} sessions, {} breaks, due {}",
            item.name,
            item.assignment_id,
            item.scheduled_minutes,
            item.requested_minutes,
            item.study_block_ids.len(),
            item.break_block_ids.len(),
            item.effective_due.format("%Y-%m-%d %H:%M")
        );
    }
    if !report.skipped_already_scheduled.is_empty() {
        let skipped = report
            .skipped_already_scheduled
            .iter()
            .map(|id| format!("#{id}"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(output, "  already scheduled: {skipped}");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::FakePlannerApi;
    use crate::domain::models::NewBlock;
    use chrono::NaiveDateTime;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "studyblock-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn app_state(&self, api: &Arc<FakePlannerApi>) -> AppState<FakePlannerApi> {
            let bootstrap = bootstrap_workspace(&self.path).expect("bootstrap workspace");
            let now = at("2026-02-16T08:00:00");
            AppState::with_api(bootstrap, Arc::clone(api), Arc::new(move || now))
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").expect("valid datetime")
    }

    #[tokio::test]
    async fn month_view_defaults_to_current_month() {
        let workspace = TempWorkspace::new();
        let api = Arc::new(FakePlannerApi::default());
        api.seed_block(&NewBlock::busy(
            "Lecture",
            at("2026-02-16T09:00:00"),
            at("2026-02-16T10:00:00"),
        ));
        let state = workspace.app_state(&api);

        let view = month_view_impl(&state, None).await.expect("month view");
        assert_eq!(view.month, NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"));
        let rendered = render_month(&view);
        assert!(rendered.starts_with("February 2026\n"));
        assert!(rendered.contains("*16 x"));
        assert_eq!(rendered.lines().count(), 8);

        assert!(month_view_impl(&state, Some("2026-13".to_string())).await.is_err());
    }

    #[tokio::test]
    async fn add_block_creates_selection_and_renders_in_day_view() {
        let workspace = TempWorkspace::new();
        let api = Arc::new(FakePlannerApi::default());
        let state = workspace.app_state(&api);

        let block = add_block_impl(
            &state,
            AddBlockArgs {
                date: "2026-02-16".to_string(),
                from_row: 7,
                to_row: 6,
                title: Some("Reading".to_string()),
                block_type: Some("study".to_string()),
                assignment_id: Some(3),
            },
        )
        .await
        .expect("add block");
        assert_eq!(block.start, at("2026-02-16T09:00:00"));
        assert_eq!(block.end, at("2026-02-16T10:00:00"));
        assert_eq!(block.assignment_id, Some(3));
        assert_eq!(api.blocks().len(), 1);

        let grid = day_view_impl(&state, Some("2026-02-16".to_string()))
            .await
            .expect("day view");
        let rendered = render_day(&grid);
        assert!(rendered.contains("09:00 [s] Reading (09:00-10:00)"));
        assert!(rendered.contains("09:30   |"));

        let week = week_view_impl(&state, None).await.expect("week view");
        assert!(render_week(&week).contains("Mon 02-16"));
    }

    #[tokio::test]
    async fn add_block_rejects_bad_arguments() {
        let workspace = TempWorkspace::new();
        let api = Arc::new(FakePlannerApi::default());
        let state = workspace.app_state(&api);

        let bad_type = add_block_impl(
            &state,
            AddBlockArgs {
                date: "2026-02-16".to_string(),
                from_row: 1,
                to_row: 2,
                title: None,
                block_type: Some("nap".to_string()),
                assignment_id: None,
            },
        )
        .await;
        assert!(matches!(bad_type, Err(InfraError::InvalidInput(_))));

        let bad_row = add_block_impl(
            &state,
            AddBlockArgs {
                date: "2026-02-16".to_string(),
                from_row: 1,
                to_row: 40,
                title: None,
                block_type: None,
                assignment_id: None,
            },
        )
        .await;
        assert!(bad_row.is_err());
        assert_eq!(api.create_calls(), 0);
    }

    #[tokio::test]
    async fn delete_and_clear_report_through_command_log() {
        let workspace = TempWorkspace::new();
        let api = Arc::new(FakePlannerApi::default());
        let first = api.seed_block(&NewBlock::busy(
            "Gym",
            at("2026-02-16T07:00:00"),
            at("2026-02-16T08:00:00"),
        ));
        api.seed_block(&NewBlock::busy(
            "Lab",
            at("2026-02-18T07:00:00"),
            at("2026-02-18T08:00:00"),
        ));
        let stuck = api.seed_block(&NewBlock::busy(
            "Seminar",
            at("2026-02-19T07:00:00"),
            at("2026-02-19T08:00:00"),
        ));
        let state = workspace.app_state(&api);

        delete_block_impl(&state, first).await.expect("delete");
        api.fail_delete(stuck);
        let error = clear_calendar_impl(&state, None).await.expect_err("partial clear");
        let message = state.command_error("clear_calendar", &error);
        assert!(message.contains(&stuck.to_string()));
        assert_eq!(api.blocks().len(), 1);

        let log = fs::read_to_string(workspace.path.join("logs").join("commands.log"))
            .expect("command log");
        assert!(log.contains("\"command\":\"delete_block\""));
        assert!(log.contains("\"level\":\"error\""));
    }

    #[tokio::test]
    async fn auto_schedule_reports_summary() {
        let workspace = TempWorkspace::new();
        let api = Arc::new(FakePlannerApi::default());
        api.add_assignment(FakePlannerApi::assignment(1, "Essay", 50, None));
        let state = workspace.app_state(&api);

        let report = auto_schedule_impl(&state, StdRng::seed_from_u64(11))
            .await
            .expect("auto schedule");
        let rendered = render_batch_report(&report);
        assert!(rendered.starts_with("Assignments auto-scheduled successfully!"));
        assert!(rendered.contains("Essay (#1) 50/50 min in 2 sessions, 1 breaks"));

        let rerun = auto_schedule_impl(&state, StdRng::seed_from_u64(11))
            .await
            .expect("auto schedule");
        assert!(render_batch_report(&rerun).contains("already scheduled: #1"));
    }
}
