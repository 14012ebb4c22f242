use crate::domain::models::{
    ActivityType, Assignment, AssignmentId, BlockId, BreakActivity, CalendarBlock, NewBlock,
    Settings,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_api::PlannerApi;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy)]
pub enum FakeFailure {
    Network,
    Status(u16),
}

impl FakeFailure {
    fn to_error(self) -> InfraError {
        match self {
            FakeFailure::Network => InfraError::Network("connection refused".to_string()),
            FakeFailure::Status(status) => InfraError::Http {
                status,
                body: "{\"detail\":\"fake failure\"}".to_string(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    settings: Option<Settings>,
    assignments: Vec<Assignment>,
    activities: Vec<BreakActivity>,
    blocks: Vec<CalendarBlock>,
    next_id: BlockId,
    fail_reads: bool,
    scripted_create_failures: VecDeque<FakeFailure>,
    persistent_create_failure: Option<FakeFailure>,
    failing_deletes: HashSet<BlockId>,
    create_calls: usize,
    delete_calls: usize,
    list_block_calls: usize,
}

/// In-memory backend with scripted failures.
#[derive(Debug, Default)]
pub struct FakePlannerApi {
    state: Mutex<FakeState>,
}

impl FakePlannerApi {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake planner state lock")
    }

    pub fn assignment(
        id: AssignmentId,
        name: &str,
        estimated_time: i64,
        due_date: Option<NaiveDateTime>,
    ) -> Assignment {
        Assignment {
            id,
            name: name.to_string(),
            estimated_time,
            time_spent: 0,
            due_date,
            completed: false,
        }
    }

    pub fn set_settings(&self, settings: Settings) {
        self.state().settings = Some(settings);
    }

    pub fn add_assignment(&self, assignment: Assignment) {
        self.state().assignments.push(assignment);
    }

    pub fn add_break_activity(&self, name: &str, activity_type: ActivityType) {
        let mut state = self.state();
        let id = state.activities.len() as i64 + 1;
        state.activities.push(BreakActivity {
            id,
            name: name.to_string(),
            activity_type,
        });
    }

    pub fn seed_block(&self, payload: &NewBlock) -> BlockId {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        state.blocks.push(CalendarBlock::from_new(id, payload));
        id
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    pub fn script_create_failures(&self, failures: impl IntoIterator<Item = FakeFailure>) {
        self.state().scripted_create_failures.extend(failures);
    }

    pub fn fail_all_creates(&self, failure: Option<FakeFailure>) {
        self.state().persistent_create_failure = failure;
    }

    pub fn fail_delete(&self, block_id: BlockId) {
        self.state().failing_deletes.insert(block_id);
    }

    pub fn blocks(&self) -> Vec<CalendarBlock> {
        self.state().blocks.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.state().delete_calls
    }

    pub fn list_block_calls(&self) -> usize {
        self.state().list_block_calls
    }
}

#[async_trait]
impl PlannerApi for FakePlannerApi {
    async fn get_settings(&self) -> Result<Settings, InfraError> {
        let state = self.state();
        if state.fail_reads {
            return Err(FakeFailure::Network.to_error());
        }
        Ok(state.settings.clone().unwrap_or_default())
    }

    async fn list_assignments(&self) -> Result<Vec<Assignment>, InfraError> {
        let state = self.state();
        if state.fail_reads {
            return Err(FakeFailure::Network.to_error());
        }
        Ok(state.assignments.clone())
    }

    async fn list_break_activities(&self) -> Result<Vec<BreakActivity>, InfraError> {
        let state = self.state();
        if state.fail_reads {
            return Err(FakeFailure::Status(500).to_error());
        }
        Ok(state.activities.clone())
    }

    async fn list_blocks(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CalendarBlock>, InfraError> {
        let mut state = self.state();
        state.list_block_calls += 1;
        if state.fail_reads {
            return Err(FakeFailure::Network.to_error());
        }
        Ok(state
            .blocks
            .iter()
            .filter(|block| block.end > start && block.start < end)
            .cloned()
            .collect())
    }

    async fn create_block(&self, payload: &NewBlock) -> Result<BlockId, InfraError> {
        let mut state = self.state();
        state.create_calls += 1;
        if let Some(failure) = state.scripted_create_failures.pop_front() {
            return Err(failure.to_error());
        }
        if let Some(failure) = state.persistent_create_failure {
            return Err(failure.to_error());
        }
        payload.validate().map_err(InfraError::InvalidInput)?;
        state.next_id += 1;
        let id = state.next_id;
        state.blocks.push(CalendarBlock::from_new(id, payload));
        Ok(id)
    }

    async fn delete_block(&self, block_id: BlockId) -> Result<(), InfraError> {
        let mut state = self.state();
        state.delete_calls += 1;
        if state.failing_deletes.contains(&block_id) {
            return Err(FakeFailure::Status(500).to_error());
        }
        let before = state.blocks.len();
        state.blocks.retain(|block| block.id != block_id);
        if state.blocks.len() == before {
            return Err(FakeFailure::Status(404).to_error());
        }
        Ok(())
    }
}
