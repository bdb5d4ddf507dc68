use super::Nav;
use crate::middleware::csrf::CsrfToken;
use crate::models::user::current_user;
use crate::AppState;
use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use tower_sessions::Session;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub nav: Nav,
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub nav: Nav,
}

/// Landing page; signed-in users go straight to their dashboard.
pub async fn index(session: Session, csrf: CsrfToken) -> Response {
    if current_user(&session).await.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    IndexTemplate {
        nav: Nav::guest("home", &csrf),
    }
    .into_response()
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness: the database must answer.
pub async fn readiness_check(State(state): State<AppState>) -> Response {
    match state.db.health_check().await {
        Ok(()) => Json(serde_json::json!({ "status": "ready" })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

pub async fn not_found(session: Session, csrf: CsrfToken) -> Response {
    let nav = match current_user(&session).await {
        Some(user) => Nav::user(&user, ""),
        None => Nav::guest("", &csrf),
    };
    (StatusCode::NOT_FOUND, NotFoundTemplate { nav }).into_response()
}
