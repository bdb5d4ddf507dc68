//! Totals, category breakdowns, budget remaining and monthly trend buckets.
//!
//! Everything here works on rows already scoped to one user and date range, so the
//! functions are pure and independent of the database.

use crate::models::{Budget, Entry, EntryType};
use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Number of months shown in the trend chart, including the current one.
pub const TREND_MONTHS: u32 = 6;

pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub income: Decimal,
    pub expense: Decimal,
}

impl Totals {
    pub fn net(&self) -> Decimal {
        self.income - self.expense
    }

    fn add(&mut self, entry: &Entry) {
        match entry.kind() {
            Some(EntryType::Income) => self.income += entry.amount,
            Some(EntryType::Expense) => self.expense += entry.amount,
            None => {}
        }
    }
}

pub fn summarize(entries: &[Entry]) -> Totals {
    let mut totals = Totals::default();
    for entry in entries {
        totals.add(entry);
    }
    totals
}

/// Per-category totals. `category_id` is `None` for the uncategorized row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub category_id: Option<Uuid>,
    pub name: String,
    pub income: Decimal,
    pub expense: Decimal,
    pub count: usize,
}

impl CategorySummary {
    pub fn net(&self) -> Decimal {
        self.income - self.expense
    }
}

/// Groups entries by category, ordered by name with the uncategorized row last.
pub fn category_breakdown(entries: &[Entry]) -> Vec<CategorySummary> {
    let mut groups: BTreeMap<Option<Uuid>, CategorySummary> = BTreeMap::new();

    for entry in entries {
        let summary = groups
            .entry(entry.category_id)
            .or_insert_with(|| CategorySummary {
                category_id: entry.category_id,
                name: entry.category_label().to_string(),
                income: Decimal::ZERO,
                expense: Decimal::ZERO,
                count: 0,
            });

        match entry.kind() {
            Some(EntryType::Income) => summary.income += entry.amount,
            Some(EntryType::Expense) => summary.expense += entry.amount,
            None => {}
        }
        summary.count += 1;
    }

    let mut rows: Vec<CategorySummary> = groups.into_values().collect();
    rows.sort_by(|a, b| {
        a.category_id
            .is_none()
            .cmp(&b.category_id.is_none())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    rows
}

/// Spend against one budget scope for a month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetStatus {
    pub budget_id: Uuid,
    pub category_id: Option<Uuid>,
    pub label: String,
    pub limit: Decimal,
    pub spent: Decimal,
}

impl BudgetStatus {
    /// `limit - spent`; negative when over budget.
    pub fn remaining(&self) -> Decimal {
        self.limit - self.spent
    }

    pub fn is_over(&self) -> bool {
        self.spent > self.limit
    }

    /// Share of the limit already spent, clamped to 0..=100 for progress bars.
    pub fn percent_used(&self) -> u32 {
        if self.limit <= Decimal::ZERO {
            return 100;
        }
        let pct = (self.spent * Decimal::ONE_HUNDRED / self.limit).round();
        pct.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
            .to_u32()
            .unwrap_or(100)
    }

    /// Status for the budget covering `scope` (`None` = overall), if one exists.
    ///
    /// The overall scope counts every expense; a category scope only counts expenses
    /// tagged with that category.
    pub fn for_scope(budgets: &[Budget], entries: &[Entry], scope: Option<Uuid>) -> Option<Self> {
        let budget = budgets.iter().find(|b| b.category_id == scope)?;

        let spent: Decimal = entries
            .iter()
            .filter(|e| e.is_expense())
            .filter(|e| scope.is_none() || e.category_id == scope)
            .map(|e| e.amount)
            .sum();

        Some(Self {
            budget_id: budget.budget_id,
            category_id: budget.category_id,
            label: budget.scope_label().to_string(),
            limit: budget.amount,
            spent,
        })
    }
}

/// One status per budget, overall first and then categories by name.
pub fn budget_statuses(budgets: &[Budget], entries: &[Entry]) -> Vec<BudgetStatus> {
    let mut statuses: Vec<BudgetStatus> = budgets
        .iter()
        .filter_map(|b| BudgetStatus::for_scope(budgets, entries, b.category_id))
        .collect();

    statuses.sort_by(|a, b| {
        a.category_id
            .is_some()
            .cmp(&b.category_id.is_some())
            .then_with(|| a.label.to_lowercase().cmp(&b.label.to_lowercase()))
    });
    statuses
}

/// Remaining for `scope`, or `None` when no budget covers it.
pub fn remaining(budgets: &[Budget], entries: &[Entry], scope: Option<Uuid>) -> Option<Decimal> {
    BudgetStatus::for_scope(budgets, entries, scope).map(|s| s.remaining())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthBucket {
    pub month: NaiveDate,
    pub income: Decimal,
    pub expense: Decimal,
}

impl MonthBucket {
    pub fn label(&self) -> String {
        self.month.format("%b %Y").to_string()
    }

    pub fn key(&self) -> String {
        self.month.format("%Y-%m").to_string()
    }
}

/// Six buckets ending with the month containing `today`, zero-filled.
pub fn monthly_trend(entries: &[Entry], today: NaiveDate) -> Vec<MonthBucket> {
    let current = month_start(today);
    let mut buckets: Vec<MonthBucket> = (0..TREND_MONTHS)
        .rev()
        .map(|back| MonthBucket {
            month: shift_months(current, -(back as i32)),
            income: Decimal::ZERO,
            expense: Decimal::ZERO,
        })
        .collect();

    for entry in entries {
        let month = month_start(entry.entry_date);
        if let Some(bucket) = buckets.iter_mut().find(|b| b.month == month) {
            match entry.kind() {
                Some(EntryType::Income) => bucket.income += entry.amount,
                Some(EntryType::Expense) => bucket.expense += entry.amount,
                None => {}
            }
        }
    }

    buckets
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn next_month(month: NaiveDate) -> NaiveDate {
    shift_months(month_start(month), 1)
}

/// Moves a first-of-month date by `delta` months.
pub fn shift_months(month: NaiveDate, delta: i32) -> NaiveDate {
    let month = month_start(month);
    let shifted = if delta >= 0 {
        month.checked_add_months(Months::new(delta as u32))
    } else {
        month.checked_sub_months(Months::new(delta.unsigned_abs()))
    };
    shifted.unwrap_or(month)
}

/// First and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = month_start(date);
    let end = next_month(start).pred_opt().unwrap_or(start);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn entry(amount: &str, kind: EntryType, category: Option<(Uuid, &str)>, on: &str) -> Entry {
        Entry {
            entry_id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            title: "t".to_string(),
            amount: d(amount),
            entry_date: date(on),
            entry_type: kind.as_str().to_string(),
            category_id: category.map(|c| c.0),
            category_name: category.map(|c| c.1.to_string()),
            notes: String::new(),
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    fn budget(category: Option<(Uuid, &str)>, amount: &str) -> Budget {
        Budget {
            budget_id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            category_id: category.map(|c| c.0),
            category_name: category.map(|c| c.1.to_string()),
            month: date("2026-10-01"),
            amount: d(amount),
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn summarize_splits_income_and_expense() {
        let entries = vec![
            entry("1000.00", EntryType::Income, None, "2026-10-01"),
            entry("250.50", EntryType::Expense, None, "2026-10-02"),
            entry("49.50", EntryType::Expense, None, "2026-10-03"),
        ];

        let totals = summarize(&entries);
        assert_eq!(totals.income, d("1000.00"));
        assert_eq!(totals.expense, d("300.00"));
        assert_eq!(totals.net(), d("700.00"));
    }

    #[test]
    fn food_over_budget_scenario() {
        let food = (Uuid::new_v4(), "Food");
        let entries = vec![
            entry("100", EntryType::Expense, Some(food), "2026-10-01"),
            entry("200", EntryType::Expense, Some(food), "2026-10-05"),
            entry("50", EntryType::Expense, Some(food), "2026-10-09"),
        ];
        let budgets = vec![budget(Some(food), "300")];

        let status = BudgetStatus::for_scope(&budgets, &entries, Some(food.0)).unwrap();
        assert_eq!(status.spent, d("350"));
        assert_eq!(status.remaining(), d("-50"));
        assert!(status.is_over());
        assert_eq!(status.percent_used(), 100);
    }

    #[test]
    fn remaining_is_none_without_budget() {
        let food = (Uuid::new_v4(), "Food");
        let entries = vec![entry("10", EntryType::Expense, Some(food), "2026-10-01")];

        assert_eq!(remaining(&[], &entries, Some(food.0)), None);
        assert_eq!(remaining(&[], &entries, None), None);
    }

    #[test]
    fn remaining_is_limit_minus_expense() {
        let food = (Uuid::new_v4(), "Food");
        let entries = vec![
            entry("40", EntryType::Expense, Some(food), "2026-10-01"),
            entry("500", EntryType::Income, Some(food), "2026-10-01"),
        ];
        let budgets = vec![budget(Some(food), "100")];

        assert_eq!(remaining(&budgets, &entries, Some(food.0)), Some(d("60")));
    }

    #[test]
    fn uncategorized_entries_count_only_toward_overall() {
        let food = (Uuid::new_v4(), "Food");
        let entries = vec![
            entry("30", EntryType::Expense, Some(food), "2026-10-01"),
            entry("70", EntryType::Expense, None, "2026-10-02"),
        ];
        let budgets = vec![budget(None, "500"), budget(Some(food), "100")];

        let statuses = budget_statuses(&budgets, &entries);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].label, "Overall");
        assert_eq!(statuses[0].spent, d("100"));
        assert_eq!(statuses[1].label, "Food");
        assert_eq!(statuses[1].spent, d("30"));
    }

    #[test]
    fn breakdown_puts_uncategorized_last() {
        let food = (Uuid::new_v4(), "Food");
        let bills = (Uuid::new_v4(), "bills");
        let entries = vec![
            entry("5", EntryType::Expense, None, "2026-10-01"),
            entry("10", EntryType::Expense, Some(food), "2026-10-01"),
            entry("20", EntryType::Income, Some(bills), "2026-10-01"),
            entry("7", EntryType::Expense, Some(food), "2026-10-02"),
        ];

        let rows = category_breakdown(&entries);
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["bills", "Food", UNCATEGORIZED]);
        assert_eq!(rows[1].expense, d("17"));
        assert_eq!(rows[1].count, 2);
        assert_eq!(rows[0].net(), d("20"));
    }

    #[test]
    fn trend_has_six_zero_filled_buckets_ending_this_month() {
        let entries = vec![
            entry("100", EntryType::Income, None, "2026-10-03"),
            entry("40", EntryType::Expense, None, "2026-08-15"),
            entry("999", EntryType::Expense, None, "2026-01-15"),
        ];

        let trend = monthly_trend(&entries, date("2026-10-16"));
        assert_eq!(trend.len(), 6);
        assert_eq!(trend[0].month, date("2026-05-01"));
        assert_eq!(trend[5].month, date("2026-10-01"));
        assert_eq!(trend[5].income, d("100"));
        assert_eq!(trend[3].expense, d("40"));
        assert_eq!(trend[4].expense, Decimal::ZERO);
        assert_eq!(trend[5].key(), "2026-10");
    }

    #[test]
    fn trend_crosses_year_boundary() {
        let trend = monthly_trend(&[], date("2026-02-10"));
        assert_eq!(trend[0].month, date("2025-09-01"));
        assert_eq!(trend[5].month, date("2026-02-01"));
    }

    #[test]
    fn month_bounds_handle_short_months() {
        assert_eq!(
            month_bounds(date("2028-02-14")),
            (date("2028-02-01"), date("2028-02-29"))
        );
        assert_eq!(next_month(date("2026-12-31")), date("2027-01-01"));
    }
}
