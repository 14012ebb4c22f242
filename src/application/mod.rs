pub mod block_store;
pub mod bootstrap;
pub mod calendar_view;
pub mod commands;
pub mod planner_data;
pub mod retry;
pub mod scheduler;

#[cfg(test)]
pub mod testing;
