use super::{
    category_options, found, parse_id, CategoryOption, EntryRow, FilterValues, HeaderLink, Nav,
};
use crate::forms::{EntryForm, FormErrors};
use crate::models::{AuthUser, Entry, EntryInput, EntryType};
use crate::services::filters::{EntryFilterParams, Page, PAGE_SIZE};
use crate::services::sorting::{SortColumn, SortState};
use crate::AppState;
use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::Utc;
use serde::Serialize;
use service_core::error::AppError;
use uuid::Uuid;

/// The sortable, paginated entries table.
pub struct EntriesTable {
    pub rows: Vec<EntryRow>,
    pub headers: Vec<HeaderLink>,
    pub total: i64,
    pub page: u32,
    pub pages: u32,
    pub prev_href: String,
    pub next_href: String,
}

impl EntriesTable {
    fn build(page: Page<Entry>, params: &EntryFilterParams, sort: SortState) -> Self {
        let headers = SortColumn::ALL
            .into_iter()
            .map(|column| {
                let next = sort.toggled(column);
                HeaderLink {
                    key: column.as_str(),
                    label: column.label(),
                    href: format!(
                        "/entries?{}",
                        params.query_with(column.as_str(), next.direction.as_str(), 1)
                    ),
                    indicator: sort.indicator(column),
                }
            })
            .collect();

        let link = |target: u32| {
            format!(
                "/entries?{}",
                params.query_with(sort.column.as_str(), sort.direction.as_str(), target)
            )
        };

        Self {
            rows: page.items.iter().map(EntryRow::from).collect(),
            headers,
            total: page.total,
            page: page.page,
            pages: page.pages(),
            prev_href: if page.has_prev() { link(page.page - 1) } else { String::new() },
            next_href: if page.has_next() { link(page.page + 1) } else { String::new() },
        }
    }

    fn empty() -> Self {
        Self {
            rows: Vec::new(),
            headers: Vec::new(),
            total: 0,
            page: 1,
            pages: 1,
            prev_href: String::new(),
            next_href: String::new(),
        }
    }
}

#[derive(Template)]
#[template(path = "entries.html")]
pub struct EntriesTemplate {
    pub nav: Nav,
    pub table: EntriesTable,
    pub filters: FilterValues,
    pub filter_errors: FormErrors,
    pub form: EntryForm,
    pub errors: FormErrors,
    pub categories: Vec<CategoryOption>,
}

#[derive(Template)]
#[template(path = "partials/entries_table.html")]
pub struct EntriesTableFragment {
    pub table: EntriesTable,
}

#[derive(Template)]
#[template(path = "entry_detail.html")]
pub struct EntryDetailTemplate {
    pub nav: Nav,
    pub entry: EntryRow,
    pub created: String,
    pub updated: String,
}

#[derive(Template)]
#[template(path = "entry_edit.html")]
pub struct EntryEditTemplate {
    pub nav: Nav,
    pub entry_id: String,
    pub form: EntryForm,
    pub errors: FormErrors,
    pub categories: Vec<CategoryOption>,
}

#[derive(Serialize)]
pub struct FilterResponse {
    pub html: String,
    pub total: i64,
    pub page: u32,
    pub pages: u32,
}

fn blank_form() -> EntryForm {
    EntryForm {
        entry_date: Utc::now().date_naive().format("%Y-%m-%d").to_string(),
        entry_type: EntryType::Expense.as_str().to_string(),
        ..EntryForm::default()
    }
}

fn render_error(e: askama::Error) -> AppError {
    AppError::InternalError(anyhow::anyhow!("Template error: {}", e))
}

/// Table for `params`, or the filter's field errors.
async fn load_table(
    state: &AppState,
    user: &AuthUser,
    params: &EntryFilterParams,
) -> Result<Result<EntriesTable, FormErrors>, AppError> {
    let filter = match params.parse() {
        Ok(filter) => filter,
        Err(errors) => return Ok(Err(errors)),
    };
    let sort = params.sort_state();
    let page = state
        .db
        .list_entries(user.user_id, &filter, &sort, params.page(), PAGE_SIZE)
        .await?;

    Ok(Ok(EntriesTable::build(page, params, sort)))
}

/// Renders the entries page; used for the initial load and for re-rendering the create form.
async fn render_page(
    state: &AppState,
    user: &AuthUser,
    params: &EntryFilterParams,
    form: EntryForm,
    errors: FormErrors,
) -> Result<Response, AppError> {
    let categories = state.db.list_categories(user.user_id).await?;
    let (table, filter_errors) = match load_table(state, user, params).await? {
        Ok(table) => (table, FormErrors::new()),
        Err(filter_errors) => (EntriesTable::empty(), filter_errors),
    };

    let status = if errors.is_empty() && filter_errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    let template = EntriesTemplate {
        nav: Nav::user(user, "entries"),
        table,
        filters: FilterValues::from(params),
        filter_errors,
        categories: category_options(&categories, &form.category_id),
        form,
        errors,
    };

    Ok((status, template).into_response())
}

pub async fn entries_page(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<EntryFilterParams>,
) -> Result<Response, AppError> {
    render_page(&state, &user, &params, blank_form(), FormErrors::new()).await
}

/// AJAX table refresh. Invalid filters answer 422 with the field errors.
pub async fn filter_entries(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<EntryFilterParams>,
) -> Result<Response, AppError> {
    let table = match load_table(&state, &user, &params).await? {
        Ok(table) => table,
        Err(errors) => return Ok(errors.json_response()),
    };

    let (total, page, pages) = (table.total, table.page, table.pages);
    let html = EntriesTableFragment { table }
        .render()
        .map_err(render_error)?;

    Ok(Json(FilterResponse {
        html,
        total,
        page,
        pages,
    })
    .into_response())
}

/// Maps write failures that belong next to a form field.
fn field_error(e: AppError) -> Result<FormErrors, AppError> {
    let mut errors = FormErrors::new();
    match e {
        AppError::Conflict(_) => {
            errors.add(
                "title",
                "An entry with this title, date and category already exists.",
            );
            Ok(errors)
        }
        AppError::NotFound(_) => {
            errors.add("category_id", "Select a valid category.");
            Ok(errors)
        }
        other => Err(other),
    }
}

pub async fn create_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Form(form): Form<EntryForm>,
) -> Result<Response, AppError> {
    let params = EntryFilterParams::default();

    let input: EntryInput = match form.into_input() {
        Ok(input) => input,
        Err(errors) => return render_page(&state, &user, &params, form, errors).await,
    };

    match state.db.create_entry(user.user_id, &input).await {
        Ok(entry) => {
            tracing::info!(user_id = %user.user_id, entry_id = %entry.entry_id, "Entry created");
            Ok(Redirect::to("/entries").into_response())
        }
        Err(e) => {
            let errors = field_error(e)?;
            render_page(&state, &user, &params, form, errors).await
        }
    }
}

async fn owned_entry(state: &AppState, user: &AuthUser, raw_id: &str) -> Result<Entry, AppError> {
    let entry_id: Uuid = parse_id(raw_id, "Entry")?;
    found(state.db.get_entry(user.user_id, entry_id).await?, "Entry")
}

pub async fn entry_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entry_id): Path<String>,
) -> Result<Response, AppError> {
    let entry = owned_entry(&state, &user, &entry_id).await?;

    Ok(EntryDetailTemplate {
        nav: Nav::user(&user, "entries"),
        created: entry.created_utc.format("%Y-%m-%d %H:%M UTC").to_string(),
        updated: entry.updated_utc.format("%Y-%m-%d %H:%M UTC").to_string(),
        entry: EntryRow::from(&entry),
    }
    .into_response())
}

async fn render_edit(
    state: &AppState,
    user: &AuthUser,
    entry_id: Uuid,
    form: EntryForm,
    errors: FormErrors,
) -> Result<Response, AppError> {
    let categories = state.db.list_categories(user.user_id).await?;
    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    let template = EntryEditTemplate {
        nav: Nav::user(user, "entries"),
        entry_id: entry_id.to_string(),
        categories: category_options(&categories, &form.category_id),
        form,
        errors,
    };
    Ok((status, template).into_response())
}

pub async fn edit_entry_page(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entry_id): Path<String>,
) -> Result<Response, AppError> {
    let entry = owned_entry(&state, &user, &entry_id).await?;
    render_edit(
        &state,
        &user,
        entry.entry_id,
        EntryForm::from_entry(&entry),
        FormErrors::new(),
    )
    .await
}

pub async fn update_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entry_id): Path<String>,
    Form(form): Form<EntryForm>,
) -> Result<Response, AppError> {
    // Foreign ids must 404 before any form feedback is shown.
    let entry_id = owned_entry(&state, &user, &entry_id).await?.entry_id;

    let input = match form.into_input() {
        Ok(input) => input,
        Err(errors) => return render_edit(&state, &user, entry_id, form, errors).await,
    };

    match state.db.update_entry(user.user_id, entry_id, &input).await {
        Ok(Some(_)) => Ok(Redirect::to(&format!("/entries/{}", entry_id)).into_response()),
        Ok(None) => Err(AppError::not_found("Entry")),
        Err(e) => {
            let errors = field_error(e)?;
            render_edit(&state, &user, entry_id, form, errors).await
        }
    }
}

pub async fn delete_entry(
    State(state): State<AppState>,
    user: AuthUser,
    Path(entry_id): Path<String>,
) -> Result<Redirect, AppError> {
    let entry_id = parse_id(&entry_id, "Entry")?;

    if !state.db.delete_entry(user.user_id, entry_id).await? {
        return Err(AppError::not_found("Entry"));
    }

    tracing::info!(user_id = %user.user_id, entry_id = %entry_id, "Entry deleted");
    Ok(Redirect::to("/entries"))
}
