use super::{
    category_options, remaining_label, CategoryOption, FilterValues, HeaderLink, Nav, SummaryRow,
    TotalsView,
};
use crate::forms::FormErrors;
use crate::models::{AuthUser, Entry};
use crate::services::aggregation::{category_breakdown, month_bounds, remaining, summarize};
use crate::services::export::{encode_header, encode_rows, CSV_FILENAME};
use crate::services::filters::{EntryFilter, EntryFilterParams};
use crate::services::sorting::{sort_summaries, SortDirection, SortState, SummarySort};
use crate::AppState;
use askama::Template;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Rows encoded per body chunk of the CSV export.
const EXPORT_CHUNK_ROWS: usize = 200;

const SUMMARY_COLUMNS: [(SummarySort, &str); 4] = [
    (SummarySort::Name, "Category"),
    (SummarySort::Income, "Income"),
    (SummarySort::Expenses, "Expenses"),
    (SummarySort::Net, "Net"),
];

pub struct ReportTable {
    pub headers: Vec<HeaderLink>,
    pub rows: Vec<SummaryRow>,
    pub totals: TotalsView,
    pub budget_scope: String,
    pub remaining: String,
    pub remaining_over: bool,
    pub export_href: String,
}

#[derive(Template)]
#[template(path = "reports.html")]
pub struct ReportsTemplate {
    pub nav: Nav,
    pub report: ReportTable,
    pub filters: FilterValues,
    pub filter_errors: FormErrors,
    pub categories: Vec<CategoryOption>,
}

#[derive(Template)]
#[template(path = "partials/report_table.html")]
pub struct ReportTableFragment {
    pub report: ReportTable,
}

fn summary_headers(
    params: &EntryFilterParams,
    column: SummarySort,
    direction: SortDirection,
) -> Vec<HeaderLink> {
    SUMMARY_COLUMNS
        .into_iter()
        .map(|(candidate, label)| {
            let (next, indicator) = if candidate == column {
                let arrow = if direction == SortDirection::Asc { "▲" } else { "▼" };
                (direction.flipped(), arrow)
            } else {
                (SortDirection::Asc, "")
            };
            HeaderLink {
                key: candidate.as_str(),
                label,
                href: format!(
                    "/reports?{}",
                    params.query_with(candidate.as_str(), next.as_str(), 1)
                ),
                indicator,
            }
        })
        .collect()
}

/// The whole month, narrowed only by the selected category.
fn budget_scope_filter(
    filter: &EntryFilter,
    month_from: NaiveDate,
    month_to: NaiveDate,
) -> EntryFilter {
    EntryFilter {
        from: Some(month_from),
        to: Some(month_to),
        category_id: filter.category_id,
        ..EntryFilter::default()
    }
}

/// Category summary and totals for the filter, plus the remaining budget for the selected
/// scope in the month the range starts.
///
/// Remaining is a monthly figure: it counts every expense of that month in the scope,
/// whatever the date, text, amount or type filters narrow the table to.
async fn build_report(
    state: &AppState,
    user: &AuthUser,
    params: &EntryFilterParams,
    filter: &EntryFilter,
) -> Result<ReportTable, AppError> {
    let entries = state.db.filtered_entries(user.user_id, filter).await?;

    let (column, direction) = params.summary_sort();
    let mut rows = category_breakdown(&entries);
    sort_summaries(&mut rows, column, direction);

    let (month_from, month_to) = month_bounds(filter.from.unwrap_or_else(|| Utc::now().date_naive()));
    let budgets = state.db.list_budgets(user.user_id, month_from).await?;
    let month_entries = state
        .db
        .filtered_entries(user.user_id, &budget_scope_filter(filter, month_from, month_to))
        .await?;
    let left = remaining(&budgets, &month_entries, filter.category_id);

    let scope = match filter.category_id {
        None => "Overall".to_string(),
        Some(id) => budgets
            .iter()
            .find(|b| b.category_id == Some(id))
            .map(|b| b.scope_label().to_string())
            .unwrap_or_else(|| "Category".to_string()),
    };

    let export_query = params.query_with(column.as_str(), direction.as_str(), 1);

    Ok(ReportTable {
        headers: summary_headers(params, column, direction),
        rows: rows.iter().map(SummaryRow::from).collect(),
        totals: summarize(&entries).into(),
        budget_scope: format!("{} budget, {}", scope, month_from.format("%B %Y")),
        remaining: remaining_label(left),
        remaining_over: left.map(|r| r < Decimal::ZERO).unwrap_or(false),
        export_href: format!("/reports/export.csv?{}", export_query),
    })
}

pub async fn reports_page(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<EntryFilterParams>,
) -> Result<Response, AppError> {
    let categories = state.db.list_categories(user.user_id).await?;

    let (report, filter_errors, status) = match params.parse() {
        Ok(filter) => (
            build_report(&state, &user, &params, &filter).await?,
            FormErrors::new(),
            StatusCode::OK,
        ),
        Err(errors) => (
            build_report(&state, &user, &EntryFilterParams::default(), &EntryFilter::default())
                .await?,
            errors,
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
    };

    let filters = FilterValues::from(&params);
    let template = ReportsTemplate {
        nav: Nav::user(&user, "reports"),
        categories: category_options(&categories, &filters.category_id),
        report,
        filters,
        filter_errors,
    };
    Ok((status, template).into_response())
}

/// AJAX: `{"html": fragment}` for the current filters and sort.
pub async fn filter_report(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<EntryFilterParams>,
) -> Result<Response, AppError> {
    let filter = match params.parse() {
        Ok(filter) => filter,
        Err(errors) => return Ok(errors.json_response()),
    };

    let report = build_report(&state, &user, &params, &filter).await?;
    let html = ReportTableFragment { report }
        .render()
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Template error: {}", e)))?;

    Ok(Json(serde_json::json!({ "html": html })).into_response())
}

fn stream_error(e: AppError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

/// Streams matching entries as CSV.
///
/// Filters are validated before any byte is sent. Rows come from one query, so an entry
/// added or removed mid-export cannot shift the rest; a failure mid-stream aborts the body.
pub async fn export_csv(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<EntryFilterParams>,
) -> Result<Response, AppError> {
    let filter = match params.parse() {
        Ok(filter) => filter,
        Err(errors) => return Ok(errors.json_response()),
    };

    let db = state.db.clone();
    let user_id = user.user_id;
    let sort = SortState::default();
    let (tx, rx) = mpsc::channel::<Result<Vec<u8>, std::io::Error>>(4);

    tokio::spawn(async move {
        if tx.send(encode_header().map_err(stream_error)).await.is_err() {
            return;
        }

        let (rows_tx, mut rows_rx) = mpsc::channel::<Vec<Entry>>(2);
        let producer = db.stream_entries(user_id, &filter, &sort, EXPORT_CHUNK_ROWS, rows_tx);
        let encoder = async {
            while let Some(chunk) = rows_rx.recv().await {
                if tx.send(encode_rows(&chunk).map_err(stream_error)).await.is_err() {
                    break;
                }
            }
        };

        let (result, ()) = tokio::join!(producer, encoder);
        match result {
            Ok(rows) => tracing::info!(user_id = %user_id, rows, "CSV export finished"),
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "CSV export failed");
                let _ = tx.send(Err(stream_error(e))).await;
            }
        }
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", CSV_FILENAME),
            ),
        ],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response())
}
