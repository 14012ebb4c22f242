pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::block_store::{BlockStore, ClearReport};
pub use application::calendar_view::{
    CalendarViewController, ManualBlockRequest, NowProvider, ViewMode,
};
pub use application::commands::AppState;
pub use application::scheduler::{
    auto_schedule_assignments, schedule_assignment, AssignmentReport, BatchReport, SchedulerContext,
};
pub use domain::availability::is_slot_available;
pub use domain::models::{Assignment, BlockType, CalendarBlock, NewBlock, Settings};
pub use domain::time_grid::TimeGrid;
pub use infrastructure::config::ClientConfig;
pub use infrastructure::error::InfraError;
pub use infrastructure::planner_api::{PlannerApi, ReqwestPlannerApi};
