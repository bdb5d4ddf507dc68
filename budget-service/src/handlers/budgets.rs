use super::{category_options, parse_id, remaining_label, BudgetRow, CategoryOption, Nav};
use crate::forms::budget::parse_month;
use crate::forms::{BudgetForm, FormErrors};
use crate::models::{AuthUser, BudgetWrite};
use crate::services::aggregation::{
    budget_statuses, month_bounds, month_start, remaining, shift_months, summarize,
};
use crate::AppState;
use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MonthQuery {
    pub month: Option<String>,
}

#[derive(Template)]
#[template(path = "budgets.html")]
pub struct BudgetsTemplate {
    pub nav: Nav,
    pub month: String,
    pub month_label: String,
    pub prev_month: String,
    pub next_month: String,
    pub budgets: Vec<BudgetRow>,
    pub spent: String,
    pub overall_remaining: String,
    pub overall_over: bool,
    pub categories: Vec<CategoryOption>,
    pub form: BudgetForm,
    pub errors: FormErrors,
}

fn month_key(month: NaiveDate) -> String {
    month.format("%Y-%m").to_string()
}

async fn render(
    state: &AppState,
    user: &AuthUser,
    month: NaiveDate,
    form: BudgetForm,
    errors: FormErrors,
) -> Result<Response, AppError> {
    let (from, to) = month_bounds(month);
    let budgets = state.db.list_budgets(user.user_id, from).await?;
    let entries = state.db.entries_between(user.user_id, from, to).await?;
    let categories = state.db.list_categories(user.user_id).await?;

    let statuses = budget_statuses(&budgets, &entries);
    let overall = remaining(&budgets, &entries, None);

    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    let template = BudgetsTemplate {
        nav: Nav::user(user, "budgets"),
        month: month_key(from),
        month_label: from.format("%B %Y").to_string(),
        prev_month: month_key(shift_months(from, -1)),
        next_month: month_key(shift_months(from, 1)),
        budgets: statuses.iter().map(BudgetRow::from).collect(),
        spent: super::money(summarize(&entries).expense),
        overall_remaining: remaining_label(overall),
        overall_over: overall.map(|r| r < Decimal::ZERO).unwrap_or(false),
        categories: category_options(&categories, &form.category_id),
        form,
        errors,
    };
    Ok((status, template).into_response())
}

pub async fn budgets_page(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<MonthQuery>,
) -> Result<Response, AppError> {
    let month = query
        .month
        .as_deref()
        .and_then(parse_month)
        .unwrap_or_else(|| month_start(Utc::now().date_naive()));

    let form = BudgetForm {
        month: month_key(month),
        ..BudgetForm::default()
    };
    render(&state, &user, month, form, FormErrors::new()).await
}

/// Creates or updates the budget for the submitted month and scope.
pub async fn set_budget(
    State(state): State<AppState>,
    user: AuthUser,
    Form(form): Form<BudgetForm>,
) -> Result<Response, AppError> {
    let fallback_month =
        parse_month(&form.month).unwrap_or_else(|| month_start(Utc::now().date_naive()));

    let input = match form.into_input() {
        Ok(input) => input,
        Err(errors) => return render(&state, &user, fallback_month, form, errors).await,
    };

    let mut errors = FormErrors::new();
    match state.db.set_budget(user.user_id, &input).await {
        Ok(BudgetWrite::Saved(budget)) => {
            tracing::info!(user_id = %user.user_id, budget_id = %budget.budget_id, "Budget set");
            return Ok(
                Redirect::to(&format!("/budgets?month={}", month_key(budget.month))).into_response(),
            );
        }
        Ok(BudgetWrite::Rejected(message)) => errors.add("amount", message),
        Err(AppError::NotFound(_)) => errors.add("category_id", "Select a valid category."),
        Err(e) => return Err(e),
    }

    render(&state, &user, input.month, form, errors).await
}

pub async fn delete_budget(
    State(state): State<AppState>,
    user: AuthUser,
    Path(budget_id): Path<String>,
) -> Result<Redirect, AppError> {
    let budget_id = parse_id(&budget_id, "Budget")?;

    if !state.db.delete_budget(user.user_id, budget_id).await? {
        return Err(AppError::not_found("Budget"));
    }

    Ok(Redirect::to("/budgets"))
}
