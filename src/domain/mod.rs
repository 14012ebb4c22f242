pub mod availability;
pub mod models;
pub mod time_grid;
