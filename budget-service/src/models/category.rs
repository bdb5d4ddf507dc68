use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Categories seeded for every new account.
pub const DEFAULT_CATEGORIES: [&str; 5] = ["Food", "Transport", "Entertainment", "Utilities", "Other"];

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Category {
    pub category_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}
