//! Income and expense entries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Entry type (income or expense).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Income,
    Expense,
}

impl EntryType {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Income => "Income",
            Self::Expense => "Expense",
        }
    }

    /// Accepts `income`/`expense` as well as the short `IN`/`EX` codes, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "income" | "in" => Some(Self::Income),
            "expense" | "ex" => Some(Self::Expense),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entry row joined with its category name.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Entry {
    pub entry_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub amount: Decimal,
    pub entry_date: NaiveDate,
    pub entry_type: String,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub notes: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Entry {
    /// Get parsed entry type.
    pub fn kind(&self) -> Option<EntryType> {
        EntryType::parse(&self.entry_type)
    }

    pub fn is_income(&self) -> bool {
        self.kind() == Some(EntryType::Income)
    }

    pub fn is_expense(&self) -> bool {
        self.kind() == Some(EntryType::Expense)
    }

    pub fn category_label(&self) -> &str {
        self.category_name.as_deref().unwrap_or("Uncategorized")
    }

    pub fn type_label(&self) -> &'static str {
        self.kind().map(|k| k.label()).unwrap_or("Unknown")
    }
}

/// Validated input for creating or editing an entry.
#[derive(Debug, Clone)]
pub struct EntryInput {
    pub title: String,
    pub amount: Decimal,
    pub entry_date: NaiveDate,
    pub entry_type: EntryType,
    pub category_id: Option<Uuid>,
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_codes() {
        assert_eq!(EntryType::parse("income"), Some(EntryType::Income));
        assert_eq!(EntryType::parse("IN"), Some(EntryType::Income));
        assert_eq!(EntryType::parse("Expense"), Some(EntryType::Expense));
        assert_eq!(EntryType::parse("ex"), Some(EntryType::Expense));
        assert_eq!(EntryType::parse("transfer"), None);
    }
}
