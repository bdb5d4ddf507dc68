//! service-core: shared web infrastructure for the budget dashboard.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

pub use error::AppError;
