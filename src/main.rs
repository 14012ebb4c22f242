use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::process::ExitCode;
use studyblock::application::commands::{
    add_block_impl, auto_schedule_impl, clear_calendar_impl, day_view_impl, delete_block_impl,
    month_view_impl, render_batch_report, render_day, render_month, render_week, week_view_impl,
    AddBlockArgs, AppState,
};
use studyblock::InfraError;

#[derive(Parser)]
#[command(name = "studyblock", about = "Study block calendar and auto-scheduler", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace directory holding config/ and logs/
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Planner backend base URL
    #[arg(long, global = true, env = "STUDYBLOCK_BASE_URL")]
    base_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the month grid
    Month {
        /// Month to show, YYYY-MM
        #[arg(long)]
        month: Option<String>,
    },

    /// Show one day's rows
    Day {
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
    },

    /// Show the week containing a day
    Week {
        #[arg(long)]
        date: Option<String>,
    },

    /// Place study sessions for every unscheduled assignment
    AutoSchedule,

    /// Create a block over a range of grid rows
    Add {
        #[arg(long)]
        date: String,
        #[arg(long)]
        from_row: usize,
        #[arg(long)]
        to_row: usize,
        #[arg(long)]
        title: Option<String>,
        /// study or busy
        #[arg(long = "type")]
        block_type: Option<String>,
        #[arg(long = "assignment")]
        assignment_id: Option<i64>,
    },

    /// Delete a block by id
    Delete { id: i64 },

    /// Delete every block in the current month's range
    Clear {
        #[arg(long)]
        month: Option<String>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Month { .. } => "month",
            Commands::Day { .. } => "day",
            Commands::Week { .. } => "week",
            Commands::AutoSchedule => "auto_schedule",
            Commands::Add { .. } => "add_block",
            Commands::Delete { .. } => "delete_block",
            Commands::Clear { .. } => "clear_calendar",
        }
    }
}

async fn run(state: &AppState, command: Commands) -> Result<String, InfraError> {
    let output = match command {
        Commands::Month { month } => render_month(&month_view_impl(state, month).await?),
        Commands::Day { date } => render_day(&day_view_impl(state, date).await?),
        Commands::Week { date } => render_week(&week_view_impl(state, date).await?),
        Commands::AutoSchedule => {
            let report = auto_schedule_impl(state, StdRng::from_os_rng()).await?;
            render_batch_report(&report)
        }
        Commands::Add {
            date,
            from_row,
            to_row,
            title,
            block_type,
            assignment_id,
        } => {
            let block = add_block_impl(
                state,
                AddBlockArgs {
                    date,
                    from_row,
                    to_row,
                    title,
                    block_type,
                    assignment_id,
                },
            )
            .await?;
            format!(
                "created block {}: {} {} - {}\n",
                block.id,
                block.title,
                block.start.format("%Y-%m-%d %H:%M"),
                block.end.format("%H:%M")
            )
        }
        Commands::Delete { id } => {
            delete_block_impl(state, id).await?;
            format!("deleted block {id}\n")
        }
        Commands::Clear { month } => {
            let report = clear_calendar_impl(state, month).await?;
            format!("deleted {} blocks\n", report.deleted)
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let workspace_root = match cli.root {
        Some(path) => path,
        None => match std::env::current_dir() {
            Ok(path) => path,
            Err(error) => {
                tracing::error!(%error, "cannot resolve working directory");
                return ExitCode::FAILURE;
            }
        },
    };

    let state = match AppState::new(workspace_root, cli.base_url) {
        Ok(state) => state,
        Err(error) => {
            tracing::error!(%error, "failed to initialize workspace");
            return ExitCode::FAILURE;
        }
    };

    let command_name = cli.command.name();
    match run(&state, cli.command).await {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("error: {}", state.command_error(command_name, &error));
            ExitCode::FAILURE
        }
    }
}
