pub mod aggregation;
pub mod database;
pub mod email;
pub mod export;
pub mod filters;
pub mod insights;
pub mod metrics;
pub mod sorting;
