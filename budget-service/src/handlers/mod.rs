//! HTTP handlers and the display models their templates render.
//!
//! Templates only print strings and booleans; formatting of money, dates and optional
//! values happens here so every page shows them the same way.

pub mod app;
pub mod auth;
pub mod budgets;
pub mod categories;
pub mod dashboard;
pub mod entries;
pub mod insights;
pub mod metrics;
pub mod password_reset;
pub mod profile;
pub mod reports;

use crate::middleware::csrf::CsrfToken;
use crate::models::{AuthUser, Category, Entry};
use crate::services::aggregation::{BudgetStatus, CategorySummary, Totals};
use crate::services::filters::EntryFilterParams;
use crate::services::insights::Insights;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

/// Shown wherever a value does not exist, e.g. remaining without a budget.
pub const DASH: &str = "—";

/// Two decimal places, no currency symbol.
pub fn money(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

/// `Some(value)` or the 404 every handler uses for missing and foreign rows alike.
pub fn found<T>(value: Option<T>, resource: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::not_found(resource))
}

/// Path ids that are not UUIDs get the same 404 as unknown ones.
pub fn parse_id(raw: &str, resource: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::not_found(resource))
}

/// Navigation bar state, plus the CSRF token every page layout renders.
pub struct Nav {
    pub signed_in: bool,
    pub user_name: String,
    pub current: &'static str,
    pub csrf_token: String,
}

impl Nav {
    pub fn guest(current: &'static str, csrf: &CsrfToken) -> Self {
        Self {
            signed_in: false,
            user_name: String::new(),
            current,
            csrf_token: csrf.0.clone(),
        }
    }

    pub fn user(user: &AuthUser, current: &'static str) -> Self {
        Self {
            signed_in: true,
            user_name: user.name(),
            current,
            csrf_token: user.csrf_token.clone(),
        }
    }
}

pub struct EntryRow {
    pub id: String,
    pub title: String,
    pub category: String,
    pub amount: String,
    pub date: String,
    pub type_label: &'static str,
    pub is_income: bool,
    pub notes: String,
}

impl From<&Entry> for EntryRow {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.entry_id.to_string(),
            title: entry.title.clone(),
            category: entry.category_label().to_string(),
            amount: money(entry.amount),
            date: entry.entry_date.format("%Y-%m-%d").to_string(),
            type_label: entry.type_label(),
            is_income: entry.is_income(),
            notes: entry.notes.clone(),
        }
    }
}

pub struct TotalsView {
    pub income: String,
    pub expense: String,
    pub net: String,
    pub negative: bool,
}

impl From<Totals> for TotalsView {
    fn from(totals: Totals) -> Self {
        Self {
            income: money(totals.income),
            expense: money(totals.expense),
            net: money(totals.net()),
            negative: totals.net() < Decimal::ZERO,
        }
    }
}

pub struct SummaryRow {
    pub name: String,
    pub income: String,
    pub expense: String,
    pub net: String,
    pub count: usize,
    pub negative: bool,
    pub uncategorized: bool,
}

impl From<&CategorySummary> for SummaryRow {
    fn from(summary: &CategorySummary) -> Self {
        Self {
            name: summary.name.clone(),
            income: money(summary.income),
            expense: money(summary.expense),
            net: money(summary.net()),
            count: summary.count,
            negative: summary.net() < Decimal::ZERO,
            uncategorized: summary.category_id.is_none(),
        }
    }
}

pub struct BudgetRow {
    pub id: String,
    pub label: String,
    pub limit: String,
    pub spent: String,
    pub remaining: String,
    pub over: bool,
    pub percent: u32,
    pub overall: bool,
}

impl From<&BudgetStatus> for BudgetRow {
    fn from(status: &BudgetStatus) -> Self {
        Self {
            id: status.budget_id.to_string(),
            label: status.label.clone(),
            limit: money(status.limit),
            spent: money(status.spent),
            remaining: money(status.remaining()),
            over: status.is_over(),
            percent: status.percent_used(),
            overall: status.category_id.is_none(),
        }
    }
}

/// Remaining for display: the amount, or a dash when no budget covers the scope.
pub fn remaining_label(remaining: Option<Decimal>) -> String {
    remaining.map(money).unwrap_or_else(|| DASH.to_string())
}

pub struct CategoryOption {
    pub id: String,
    pub name: String,
    pub selected: bool,
}

/// Select options with `selected_id` marked.
pub fn category_options(categories: &[Category], selected_id: &str) -> Vec<CategoryOption> {
    categories
        .iter()
        .map(|c| {
            let id = c.category_id.to_string();
            CategoryOption {
                selected: id == selected_id,
                id,
                name: c.name.clone(),
            }
        })
        .collect()
}

/// Filter inputs echoed back into the filter form.
#[derive(Default)]
pub struct FilterValues {
    pub from: String,
    pub to: String,
    pub q: String,
    pub category: String,
    pub category_id: String,
    pub min: String,
    pub max: String,
    pub entry_type: String,
}

impl From<&EntryFilterParams> for FilterValues {
    fn from(params: &EntryFilterParams) -> Self {
        let value = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            from: value(&params.from),
            to: value(&params.to),
            q: value(&params.q),
            category: value(&params.category),
            category_id: value(&params.category_id),
            min: value(&params.min),
            max: value(&params.max),
            entry_type: value(&params.entry_type).to_ascii_lowercase(),
        }
    }
}

/// Column header link with its sort arrow.
pub struct HeaderLink {
    pub key: &'static str,
    pub label: &'static str,
    pub href: String,
    pub indicator: &'static str,
}

pub struct InsightsPanel {
    pub available: bool,
    pub text: String,
    pub message: &'static str,
}

impl From<Insights> for InsightsPanel {
    fn from(insights: Insights) -> Self {
        match insights {
            Insights::Available(text) => Self {
                available: true,
                text,
                message: "",
            },
            Insights::Unavailable(reason) => Self {
                available: false,
                text: String::new(),
                message: reason.message(),
            },
        }
    }
}
