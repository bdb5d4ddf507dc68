use super::Nav;
use crate::forms::{FormErrors, LoginForm, RegisterForm};
use crate::middleware::csrf::CsrfToken;
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
use tower_sessions::Session;
use validator::Validate;

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub nav: Nav,
    pub email: String,
    pub error: String,
    pub notice: String,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub nav: Nav,
    pub email: String,
    pub display_name: String,
    pub errors: FormErrors,
}

fn session_error(e: tower_sessions::session::Error) -> AppError {
    AppError::InternalError(anyhow::anyhow!("Session error: {}", e))
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginPageParams {
    pub reset: Option<String>,
}

pub async fn login_page(
    csrf: CsrfToken,
    Query(params): Query<LoginPageParams>,
) -> impl IntoResponse {
    let notice = match params.reset.as_deref() {
        Some("done") => "Your password has been reset. Log in with the new one.",
        _ => "",
    };

    LoginTemplate {
        nav: Nav::guest("login", &csrf),
        email: String::new(),
        error: String::new(),
        notice: notice.to_string(),
    }
}

pub async fn register_page(csrf: CsrfToken) -> impl IntoResponse {
    RegisterTemplate {
        nav: Nav::guest("register", &csrf),
        email: String::new(),
        display_name: String::new(),
        errors: FormErrors::new(),
    }
}

pub async fn login_handler(
    State(state): State<AppState>,
    session: Session,
    csrf: CsrfToken,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let email = form.normalized_email();
    let user = state.db.get_user_by_email(&email).await?;

    let verified = verify_password_blocking(
        Password::new(form.password),
        user.as_ref()
            .map(|u| PasswordHashString::new(u.password_hash.clone())),
    )
    .await?;

    match user {
        Some(user) if verified => {
            AuthUser::start_session(&session, &user)
                .await
                .map_err(session_error)?;
            tracing::info!(user_id = %user.user_id, "User logged in");
            Ok(Redirect::to("/dashboard").into_response())
        }
        _ => {
            tracing::info!("Login rejected");
            Ok((
                StatusCode::UNAUTHORIZED,
                LoginTemplate {
                    nav: Nav::guest("login", &csrf),
                    email,
                    error: "Invalid email or password".to_string(),
                    notice: String::new(),
                },
            )
                .into_response())
        }
    }
}

pub async fn register_handler(
    State(state): State<AppState>,
    session: Session,
    csrf: CsrfToken,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    let rerender = |form: &RegisterForm, errors: FormErrors| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            RegisterTemplate {
                nav: Nav::guest("register", &csrf),
                email: form.email.trim().to_string(),
                display_name: form.display_name.clone(),
                errors,
            },
        )
            .into_response()
    };

    if let Err(e) = form.validate() {
        return Ok(rerender(&form, FormErrors::from(e)));
    }

    let email = form.normalized_email();
    let hash = hash_password_blocking(Password::new(form.password.clone())).await?;

    let user = match state
        .db
        .create_user(&email, hash.as_str(), form.display_name().as_deref())
        .await
    {
        Ok(user) => user,
        Err(AppError::Conflict(_)) => {
            let mut errors = FormErrors::new();
            errors.add("email", "Email address is already in use.");
            return Ok(rerender(&form, errors));
        }
        Err(e) => return Err(e),
    };

    AuthUser::start_session(&session, &user)
        .await
        .map_err(session_error)?;
    tracing::info!(user_id = %user.user_id, "User registered");

    Ok(Redirect::to("/dashboard").into_response())
}

/// POST only, so a link or image elsewhere cannot end the session.
pub async fn logout_handler(session: Session) -> Result<Redirect, AppError> {
    session.flush().await.map_err(session_error)?;
    Ok(Redirect::to("/login"))
}
