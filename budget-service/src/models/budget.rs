use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Monthly spending limit. A `None` category is the overall budget for the month.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Budget {
    pub budget_id: Uuid,
    pub user_id: Uuid,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    /// Always the first day of the month.
    pub month: NaiveDate,
    pub amount: Decimal,
    pub created_utc: DateTime<Utc>,
}

impl Budget {
    pub fn scope_label(&self) -> &str {
        match self.category_id {
            None => "Overall",
            Some(_) => self.category_name.as_deref().unwrap_or("Unknown category"),
        }
    }

    pub fn is_overall(&self) -> bool {
        self.category_id.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct BudgetInput {
    pub month: NaiveDate,
    pub category_id: Option<Uuid>,
    pub amount: Decimal,
}

/// Result of setting a budget: either stored, or rejected because it would leave the
/// month's category budgets above the overall budget.
#[derive(Debug)]
pub enum BudgetWrite {
    Saved(Budget),
    Rejected(String),
}
