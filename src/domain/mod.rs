// Domain layer - Report model, time expressions and errors
pub mod dashboard;
pub mod error;
pub mod time_range;
