use crate::application::retry::with_retry;
use crate::domain::models::{AssignmentId, BlockId, CalendarBlock, NewBlock};
use crate::infrastructure::config::RetryPolicy;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_api::PlannerApi;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub deleted: usize,
    pub failed: Vec<BlockId>,
}

/// In-memory mirror of the backend's blocks for one date range.
///
/// Successful creates are appended locally right away so that availability
/// checks later in the same scheduling run see them; the next `reload`
/// replaces the mirror with the server's canonical view.
pub struct BlockStore<A>
where
    A: PlannerApi + 'static,
{
    api: Arc<A>,
    retry_policy: RetryPolicy,
    range: Option<(NaiveDateTime, NaiveDateTime)>,
    blocks: Vec<CalendarBlock>,
}

impl<A> BlockStore<A>
where
    A: PlannerApi + 'static,
{
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            retry_policy: RetryPolicy::default(),
            range: None,
            blocks: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn blocks(&self) -> &[CalendarBlock] {
        &self.blocks
    }

    pub fn range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        self.range
    }

    /// Replaces the mirror with the server's blocks for `[start, end)`. On failure
    /// the mirror is left empty and the error is returned.
    pub async fn load_blocks(
        &mut self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<usize, InfraError> {
        if end <= start {
            return Err(InfraError::InvalidInput(
                "block range end must be after start".to_string(),
            ));
        }
        self.range = Some((start, end));
        self.blocks.clear();

        let api = Arc::clone(&self.api);
        let loaded =
            with_retry(&self.retry_policy, "list_blocks", || api.list_blocks(start, end)).await;
        match loaded {
            Ok(blocks) => {
                self.blocks = blocks;
                tracing::debug!(count = self.blocks.len(), %start, %end, "loaded calendar blocks");
                Ok(self.blocks.len())
            }
            Err(error) => {
                tracing::error!(%error, %start, %end, "failed to load calendar blocks");
                Err(error)
            }
        }
    }

    pub async fn reload(&mut self) -> Result<usize, InfraError> {
        let Some((start, end)) = self.range else {
            return Ok(0);
        };
        self.load_blocks(start, end).await
    }

    pub async fn create_block(&mut self, payload: NewBlock) -> Result<BlockId, InfraError> {
        payload.validate().map_err(InfraError::InvalidInput)?;
        match self.api.create_block(&payload).await {
            Ok(block_id) => {
                self.blocks.push(CalendarBlock::from_new(block_id, &payload));
                tracing::debug!(
                    block_id,
                    title = %payload.title,
                    start = %payload.start,
                    "created block"
                );
                Ok(block_id)
            }
            Err(error) => {
                tracing::error!(
                    %error,
                    title = %payload.title,
                    start = %payload.start,
                    "failed to create block"
                );
                Err(error)
            }
        }
    }

    pub async fn delete_block(&mut self, block_id: BlockId) -> Result<(), InfraError> {
        self.api.delete_block(block_id).await.inspect_err(|error| {
            tracing::error!(%error, block_id, "failed to delete block");
        })?;
        self.blocks.retain(|block| block.id != block_id);
        Ok(())
    }

    /// Deletes every mirrored block concurrently, then reloads.
    pub async fn clear_calendar(&mut self) -> ClearReport {
        let mut deletes: JoinSet<(BlockId, Result<(), InfraError>)> = JoinSet::new();
        for block in &self.blocks {
            let api = Arc::clone(&self.api);
            let block_id = block.id;
            deletes.spawn(async move { (block_id, api.delete_block(block_id).await) });
        }

        let mut report = ClearReport::default();
        while let Some(joined) = deletes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.deleted += 1,
                Ok((block_id, Err(error))) => {
                    tracing::error!(%error, block_id, "failed to delete block while clearing");
                    report.failed.push(block_id);
                }
                Err(error) => tracing::error!(%error, "delete task did not complete"),
            }
        }
        report.failed.sort_unstable();

        if let Err(error) = self.reload().await {
            tracing::warn!(%error, "reload after clearing calendar failed");
        }
        tracing::info!(deleted = report.deleted, failed = report.failed.len(), "cleared calendar");
        report
    }

    /// Blocks intersecting the calendar day `date`.
    pub fn blocks_for_day(&self, date: NaiveDate) -> Vec<&CalendarBlock> {
        let day_start = date.and_time(NaiveTime::MIN);
        let day_end = day_start + Duration::days(1);
        self.blocks
            .iter()
            .filter(|block| block.start < day_end && block.end > day_start)
            .collect()
    }

    pub fn has_study_block(&self, assignment_id: AssignmentId) -> bool {
        self.blocks.iter().any(|block| block.is_study_for(assignment_id))
    }

    pub fn scheduled_minutes_for(&self, assignment_id: AssignmentId) -> i64 {
        self.blocks
            .iter()
            .filter(|block| block.is_study_for(assignment_id))
            .map(CalendarBlock::duration_minutes)
            .sum()
    }
}
