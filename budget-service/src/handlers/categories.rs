use super::{parse_id, Nav};
use crate::forms::{CategoryForm, FormErrors};
use crate::models::AuthUser;
use crate::AppState;
use askama::Template;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use service_core::error::AppError;

pub struct CategoryRow {
    pub id: String,
    pub name: String,
}

#[derive(Template)]
#[template(path = "categories.html")]
pub struct CategoriesTemplate {
    pub nav: Nav,
    pub categories: Vec<CategoryRow>,
    pub name: String,
    pub errors: FormErrors,
    /// Row whose rename failed, so the message shows next to it.
    pub rename_id: String,
}

async fn render(
    state: &AppState,
    user: &AuthUser,
    name: String,
    errors: FormErrors,
    rename_id: String,
) -> Result<Response, AppError> {
    let categories = state
        .db
        .list_categories(user.user_id)
        .await?
        .into_iter()
        .map(|c| CategoryRow {
            id: c.category_id.to_string(),
            name: c.name,
        })
        .collect();

    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    let template = CategoriesTemplate {
        nav: Nav::user(user, "categories"),
        categories,
        name,
        errors,
        rename_id,
    };
    Ok((status, template).into_response())
}

fn duplicate_name() -> FormErrors {
    let mut errors = FormErrors::new();
    errors.add("name", "You already have a category with this name.");
    errors
}

pub async fn categories_page(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    render(&state, &user, String::new(), FormErrors::new(), String::new()).await
}

pub async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    Form(form): Form<CategoryForm>,
) -> Result<Response, AppError> {
    let name = match form.into_name() {
        Ok(name) => name,
        Err(errors) => return render(&state, &user, form.name, errors, String::new()).await,
    };

    match state.db.create_category(user.user_id, &name).await {
        Ok(_) => Ok(Redirect::to("/categories").into_response()),
        Err(AppError::Conflict(_)) => {
            render(&state, &user, name, duplicate_name(), String::new()).await
        }
        Err(e) => Err(e),
    }
}

pub async fn rename_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(category_id): Path<String>,
    Form(form): Form<CategoryForm>,
) -> Result<Response, AppError> {
    let category_id = parse_id(&category_id, "Category")?;
    if state
        .db
        .get_category(user.user_id, category_id)
        .await?
        .is_none()
    {
        return Err(AppError::not_found("Category"));
    }

    let name = match form.into_name() {
        Ok(name) => name,
        Err(errors) => {
            return render(&state, &user, String::new(), errors, category_id.to_string()).await
        }
    };

    match state
        .db
        .rename_category(user.user_id, category_id, &name)
        .await
    {
        Ok(Some(_)) => Ok(Redirect::to("/categories").into_response()),
        Ok(None) => Err(AppError::not_found("Category")),
        Err(AppError::Conflict(_)) => {
            render(
                &state,
                &user,
                String::new(),
                duplicate_name(),
                category_id.to_string(),
            )
            .await
        }
        Err(e) => Err(e),
    }
}

/// Entries of the category become uncategorized; its budgets are removed.
pub async fn delete_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(category_id): Path<String>,
) -> Result<Redirect, AppError> {
    let category_id = parse_id(&category_id, "Category")?;

    if !state.db.delete_category(user.user_id, category_id).await? {
        return Err(AppError::not_found("Category"));
    }

    Ok(Redirect::to("/categories"))
}
