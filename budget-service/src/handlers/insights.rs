use super::dashboard::{current_month, trend_window};
use crate::forms::FormErrors;
use crate::models::AuthUser;
use crate::services::aggregation::{budget_statuses, category_breakdown, monthly_trend, summarize};
use crate::services::insights::{Insights, SpendingSnapshot};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

/// Answers a free-form question about the current month's spending.
///
/// Provider failures answer 503 with the reason; nothing is written either way.
pub async fn ask_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<AskRequest>,
) -> Result<Response, AppError> {
    let question = request.question.trim();
    if question.is_empty() {
        let mut errors = FormErrors::new();
        errors.add("question", "Ask a question.");
        return Ok(errors.json_response());
    }

    let today = Utc::now().date_naive();
    let (month_from, trend_entries) = trend_window(&state, &user, today).await?;
    let entries = current_month(&trend_entries, month_from);
    let budgets = state.db.list_budgets(user.user_id, month_from).await?;

    let snapshot = SpendingSnapshot::build(
        month_from.format("%B %Y").to_string(),
        summarize(&entries),
        &category_breakdown(&entries),
        &budget_statuses(&budgets, &entries),
        monthly_trend(&trend_entries, today),
    );

    match state.insights.generate(&snapshot, Some(question)).await {
        Insights::Available(text) => {
            Ok(Json(serde_json::json!({ "response": text })).into_response())
        }
        Insights::Unavailable(reason) => Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "error": "insights unavailable",
                "reason": reason.as_str(),
            })),
        )
            .into_response()),
    }
}
