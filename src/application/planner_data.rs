use crate::application::retry::with_retry;
use crate::domain::models::{Assignment, BreakActivity, Settings};
use crate::infrastructure::config::RetryPolicy;
use crate::infrastructure::planner_api::PlannerApi;

// Backend reads degrade to defaults so scheduling can still run without them.

pub async fn load_settings_or_default<A>(api: &A, retry: &RetryPolicy) -> Settings
where
    A: PlannerApi + ?Sized,
{
    match with_retry(retry, "get_settings", || api.get_settings()).await {
        Ok(settings) => settings,
        Err(error) => {
            tracing::warn!(%error, "settings unavailable, using defaults");
            Settings::default()
        }
    }
}

/// Incomplete assignments in backend order.
pub async fn load_assignments_or_empty<A>(api: &A, retry: &RetryPolicy) -> Vec<Assignment>
where
    A: PlannerApi + ?Sized,
{
    match with_retry(retry, "list_assignments", || api.list_assignments()).await {
        Ok(assignments) => assignments
            .into_iter()
            .filter(|assignment| !assignment.completed)
            .collect(),
        Err(error) => {
            tracing::warn!(%error, "assignments unavailable, continuing with none");
            Vec::new()
        }
    }
}

pub async fn load_break_activities_or_empty<A>(api: &A, retry: &RetryPolicy) -> Vec<BreakActivity>
where
    A: PlannerApi + ?Sized,
{
    match with_retry(retry, "list_break_activities", || api.list_break_activities()).await {
        Ok(activities) => activities,
        Err(error) => {
            tracing::warn!(%error, "break activities unavailable, using default titles");
            Vec::new()
        }
    }
}
