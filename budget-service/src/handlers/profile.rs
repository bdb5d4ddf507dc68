use super::{found, Nav};
use crate::forms::{FormErrors, PasswordChangeForm};
use crate::models::AuthUser;
use crate::utils::password::{
    hash_password_blocking, verify_password_blocking, Password, PasswordHashString,
};
use crate::AppState;
use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileQuery {
    pub changed: Option<String>,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub nav: Nav,
    pub email: String,
    pub display_name: String,
    pub member_since: String,
    pub changed: bool,
    pub errors: FormErrors,
}

async fn render(
    state: &AppState,
    user: &AuthUser,
    changed: bool,
    errors: FormErrors,
) -> Result<Response, AppError> {
    let account = found(state.db.get_user(user.user_id).await?, "User")?;

    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    let template = ProfileTemplate {
        nav: Nav::user(user, "profile"),
        display_name: account.name().to_string(),
        email: account.email,
        member_since: account.created_utc.format("%B %-d, %Y").to_string(),
        changed,
        errors,
    };
    Ok((status, template).into_response())
}

pub async fn profile_page(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ProfileQuery>,
) -> Result<Response, AppError> {
    render(&state, &user, query.changed.is_some(), FormErrors::new()).await
}

/// Changes the password after checking the current one.
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Form(form): Form<PasswordChangeForm>,
) -> Result<Response, AppError> {
    if let Err(e) = form.validate() {
        return render(&state, &user, false, FormErrors::from(e)).await;
    }

    let account = found(state.db.get_user(user.user_id).await?, "User")?;
    let verified = verify_password_blocking(
        Password::new(form.current_password),
        Some(PasswordHashString::new(account.password_hash)),
    )
    .await?;

    if !verified {
        let mut errors = FormErrors::new();
        errors.add("current_password", "Current password is incorrect.");
        return render(&state, &user, false, errors).await;
    }

    let hash = hash_password_blocking(Password::new(form.new_password)).await?;
    state
        .db
        .update_password(user.user_id, hash.as_str())
        .await?;

    tracing::info!(user_id = %user.user_id, "Password changed");
    Ok(Redirect::to("/profile?changed=1").into_response())
}
