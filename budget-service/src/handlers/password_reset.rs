use super::Nav;
use crate::forms::{ForgotPasswordForm, FormErrors, ResetPasswordForm};
use crate::middleware::csrf::CsrfToken;
use crate::utils::password::{hash_password_blocking, Password};
use crate::utils::tokens::{generate_token, hash_token};
use crate::AppState;
use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::Utc;
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

#[derive(Template)]
#[template(path = "forgot_password.html")]
pub struct ForgotPasswordTemplate {
    pub nav: Nav,
    pub email: String,
    pub sent: bool,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "reset_password.html")]
pub struct ResetPasswordTemplate {
    pub nav: Nav,
    pub token: String,
    pub valid: bool,
    pub errors: FormErrors,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetLinkQuery {
    pub token: String,
}

fn reset_link(base_url: &str, token: &str) -> String {
    format!("{}/reset-password?token={}", base_url.trim_end_matches('/'), token)
}

fn invalid_link(csrf: &CsrfToken) -> Response {
    (
        StatusCode::BAD_REQUEST,
        ResetPasswordTemplate {
            nav: Nav::guest("login", csrf),
            token: String::new(),
            valid: false,
            errors: FormErrors::new(),
        },
    )
        .into_response()
}

pub async fn forgot_password_page(csrf: CsrfToken) -> impl IntoResponse {
    ForgotPasswordTemplate {
        nav: Nav::guest("login", &csrf),
        email: String::new(),
        sent: false,
        errors: FormErrors::new(),
    }
}

/// Emails a single-use reset link when the address belongs to an account.
///
/// The response is the same whether or not it does, and a delivery failure is only logged.
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    csrf: CsrfToken,
    Form(form): Form<ForgotPasswordForm>,
) -> Result<Response, AppError> {
    if let Err(e) = form.validate() {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            ForgotPasswordTemplate {
                nav: Nav::guest("login", &csrf),
                email: form.email.trim().to_string(),
                sent: false,
                errors: FormErrors::from(e),
            },
        )
            .into_response());
    }

    let email = form.normalized_email();
    if let Some(user) = state.db.get_user_by_email(&email).await? {
        let settings = &state.settings.email;
        let token = generate_token();
        let expires_utc = Utc::now() + chrono::Duration::minutes(settings.reset_token_minutes);

        state
            .db
            .create_password_reset(user.user_id, &hash_token(&token), expires_utc)
            .await?;

        let link = reset_link(&settings.base_url, &token);
        match state
            .email
            .send_password_reset_email(&user.email, &link, settings.reset_token_minutes)
            .await
        {
            Ok(()) => tracing::info!(user_id = %user.user_id, "Password reset requested"),
            Err(e) => {
                tracing::error!(user_id = %user.user_id, error = %e, "Password reset email failed")
            }
        }
    } else {
        tracing::info!("Password reset requested for unknown email");
    }

    Ok(ForgotPasswordTemplate {
        nav: Nav::guest("login", &csrf),
        email: String::new(),
        sent: true,
        errors: FormErrors::new(),
    }
    .into_response())
}

pub async fn reset_password_page(
    State(state): State<AppState>,
    csrf: CsrfToken,
    Query(query): Query<ResetLinkQuery>,
) -> Result<Response, AppError> {
    if state
        .db
        .password_reset_user(&hash_token(&query.token))
        .await?
        .is_none()
    {
        return Ok(invalid_link(&csrf));
    }

    Ok(ResetPasswordTemplate {
        nav: Nav::guest("login", &csrf),
        token: query.token,
        valid: true,
        errors: FormErrors::new(),
    }
    .into_response())
}

/// Sets the new password and spends the token, then sends the user to log in.
pub async fn reset_password_handler(
    State(state): State<AppState>,
    csrf: CsrfToken,
    Form(form): Form<ResetPasswordForm>,
) -> Result<Response, AppError> {
    let token_hash = hash_token(&form.token);

    if state.db.password_reset_user(&token_hash).await?.is_none() {
        tracing::info!("Password reset with invalid token");
        return Ok(invalid_link(&csrf));
    }

    if let Err(e) = form.validate() {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            ResetPasswordTemplate {
                nav: Nav::guest("login", &csrf),
                token: form.token,
                valid: true,
                errors: FormErrors::from(e),
            },
        )
            .into_response());
    }

    let hash = hash_password_blocking(Password::new(form.new_password)).await?;

    // The token may have been spent between the check and here.
    match state.db.reset_password(&token_hash, hash.as_str()).await? {
        Some(_) => Ok(Redirect::to("/login?reset=done").into_response()),
        None => Ok(invalid_link(&csrf)),
    }
}
