use super::{remaining_label, BudgetRow, EntryRow, InsightsPanel, Nav, SummaryRow, TotalsView};
use crate::models::{AuthUser, Entry};
use crate::services::aggregation::{
    budget_statuses, category_breakdown, month_bounds, monthly_trend, remaining, shift_months,
    summarize, TREND_MONTHS,
};
use crate::services::insights::SpendingSnapshot;
use crate::AppState;
use askama::Template;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;

const RECENT_ENTRIES: i64 = 5;

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub nav: Nav,
    pub month_label: String,
    pub totals: TotalsView,
    pub overall_remaining: String,
    pub overall_over: bool,
    pub budgets: Vec<BudgetRow>,
    pub breakdown: Vec<SummaryRow>,
    pub recent: Vec<EntryRow>,
    pub insights: InsightsPanel,
}

/// Entries from the first trend month through the end of the current month.
pub(crate) async fn trend_window(
    state: &AppState,
    user: &AuthUser,
    today: NaiveDate,
) -> Result<(NaiveDate, Vec<Entry>), AppError> {
    let (month_from, month_to) = month_bounds(today);
    let trend_from = shift_months(month_from, -(TREND_MONTHS as i32 - 1));
    let entries = state
        .db
        .entries_between(user.user_id, trend_from, month_to)
        .await?;
    Ok((month_from, entries))
}

pub(crate) fn current_month(entries: &[Entry], month_from: NaiveDate) -> Vec<Entry> {
    entries
        .iter()
        .filter(|e| e.entry_date >= month_from)
        .cloned()
        .collect()
}

pub async fn dashboard_handler(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let today = Utc::now().date_naive();
    let (month_from, trend_entries) = trend_window(&state, &user, today).await?;
    let entries = current_month(&trend_entries, month_from);
    let budgets = state.db.list_budgets(user.user_id, month_from).await?;
    let recent = state.db.recent_entries(user.user_id, RECENT_ENTRIES).await?;

    let totals = summarize(&entries);
    let breakdown = category_breakdown(&entries);
    let statuses = budget_statuses(&budgets, &entries);
    let overall = remaining(&budgets, &entries, None);
    let trend = monthly_trend(&trend_entries, today);
    let month_label = month_from.format("%B %Y").to_string();

    // All reads are done; the provider call is last and bounded by its timeout.
    let snapshot = SpendingSnapshot::build(&month_label, totals, &breakdown, &statuses, trend);
    let insights = state.insights.generate(&snapshot, None).await;

    Ok(DashboardTemplate {
        nav: Nav::user(&user, "dashboard"),
        month_label,
        totals: totals.into(),
        overall_remaining: remaining_label(overall),
        overall_over: overall.map(|r| r < Decimal::ZERO).unwrap_or(false),
        budgets: statuses.iter().map(BudgetRow::from).collect(),
        breakdown: breakdown.iter().map(SummaryRow::from).collect(),
        recent: recent.iter().map(EntryRow::from).collect(),
        insights: insights.into(),
    }
    .into_response())
}

#[derive(Debug, Serialize)]
pub struct TrendSeries {
    pub labels: Vec<String>,
    pub income: Vec<f64>,
    pub expense: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct CategorySeries {
    pub labels: Vec<String>,
    pub expense: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct ChartData {
    pub trend: TrendSeries,
    pub categories: CategorySeries,
}

fn chart_number(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or(0.0)
}

/// Trend buckets and the current month's spend by category, for Chart.js.
pub async fn chart_data_handler(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ChartData>, AppError> {
    let today = Utc::now().date_naive();
    let (month_from, trend_entries) = trend_window(&state, &user, today).await?;
    let entries = current_month(&trend_entries, month_from);

    let trend = monthly_trend(&trend_entries, today);
    let breakdown: Vec<_> = category_breakdown(&entries)
        .into_iter()
        .filter(|c| c.expense > Decimal::ZERO)
        .collect();

    Ok(Json(ChartData {
        trend: TrendSeries {
            labels: trend.iter().map(|b| b.label()).collect(),
            income: trend.iter().map(|b| chart_number(b.income)).collect(),
            expense: trend.iter().map(|b| chart_number(b.expense)).collect(),
        },
        categories: CategorySeries {
            labels: breakdown.iter().map(|c| c.name.clone()).collect(),
            expense: breakdown.iter().map(|c| chart_number(c.expense)).collect(),
        },
    }))
}
