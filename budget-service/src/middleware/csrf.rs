//! Synchronizer-token CSRF protection.
//!
//! Each session carries a random token. Pages render it into a hidden `csrf_token` field
//! of every form and into a `csrf-token` meta tag that scripts send back as
//! `X-CSRF-Token`. Every state-changing request must present the session's token.

use crate::utils::tokens::{generate_token, tokens_match};
use axum::{
    async_trait,
    body::{to_bytes, Body},
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use service_core::error::AppError;
use tower_sessions::Session;

pub const CSRF_SESSION_KEY: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Largest form body buffered while looking for the token.
const MAX_FORM_BYTES: usize = 64 * 1024;

#[derive(Deserialize)]
struct CsrfField {
    csrf_token: Option<String>,
}

/// The session's token, created on first use.
pub async fn session_token(session: &Session) -> Result<String, tower_sessions::session::Error> {
    if let Some(token) = session.get::<String>(CSRF_SESSION_KEY).await? {
        return Ok(token);
    }

    let token = generate_token();
    session.insert(CSRF_SESSION_KEY, &token).await?;
    Ok(token)
}

/// Token for rendering into pages that have no signed-in user.
#[derive(Debug, Clone)]
pub struct CsrfToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to extract session",
                )
                    .into_response()
            })?;

        session_token(&session)
            .await
            .map(CsrfToken)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to load CSRF token");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn is_form(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

fn rejected() -> AppError {
    AppError::Forbidden(anyhow::anyhow!("Invalid or missing CSRF token"))
}

/// Rejects unsafe requests whose token is missing or differs from the session's.
///
/// The token is read from `X-CSRF-Token` or, for urlencoded forms, from the
/// `csrf_token` field; the buffered body is handed on unchanged.
pub async fn csrf_middleware(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if is_safe(request.method()) {
        return Ok(next.run(request).await);
    }

    let expected = session
        .get::<String>(CSRF_SESSION_KEY)
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Session error: {}", e)))?;
    let Some(expected) = expected else {
        tracing::warn!(path = %request.uri().path(), "CSRF token missing from session");
        return Err(rejected());
    };

    let from_header = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (provided, request) = match from_header {
        Some(token) => (Some(token), request),
        None if is_form(&request) => {
            let (parts, body) = request.into_parts();
            let bytes = to_bytes(body, MAX_FORM_BYTES)
                .await
                .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read body: {}", e)))?;
            let token = serde_urlencoded::from_bytes::<CsrfField>(&bytes)
                .ok()
                .and_then(|field| field.csrf_token);
            (token, Request::from_parts(parts, Body::from(bytes)))
        }
        None => (None, request),
    };

    match provided {
        Some(token) if tokens_match(&expected, &token) => Ok(next.run(request).await),
        _ => {
            tracing::warn!(path = %request.uri().path(), "CSRF token rejected");
            Err(rejected())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{header::COOKIE, HeaderValue, Request as HttpRequest},
        middleware::from_fn,
        routing::get,
        Form, Router,
    };
    use std::collections::HashMap;
    use tower::ServiceExt;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    async fn issue(token: CsrfToken) -> String {
        token.0
    }

    async fn echo(Form(form): Form<HashMap<String, String>>) -> String {
        form.get("title").cloned().unwrap_or_default()
    }

    fn app() -> Router {
        Router::new()
            .route("/token", get(issue))
            .route("/echo", axum::routing::post(echo))
            .layer(from_fn(csrf_middleware))
            .layer(SessionManagerLayer::new(MemoryStore::default()))
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Session cookie and its token.
    async fn session(app: &Router) -> (HeaderValue, String) {
        let response = app
            .clone()
            .oneshot(HttpRequest::builder().uri("/token").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        (HeaderValue::from_str(&cookie).unwrap(), body_text(response).await)
    }

    fn form_post(cookie: Option<&HeaderValue>, body: String) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie.clone());
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn form_with_session_token_passes_and_keeps_body() {
        let app = app();
        let (cookie, token) = session(&app).await;

        let response = app
            .oneshot(form_post(
                Some(&cookie),
                format!("title=Rent&csrf_token={token}"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "Rent");
    }

    #[tokio::test]
    async fn header_token_passes() {
        let app = app();
        let (cookie, token) = session(&app).await;

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/echo")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .header(COOKIE, cookie.clone())
                    .header(CSRF_HEADER, token)
                    .body(Body::from("title=Fuel"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_or_wrong_token_is_forbidden() {
        let app = app();
        let (cookie, _) = session(&app).await;

        let missing = app
            .clone()
            .oneshot(form_post(Some(&cookie), "title=Rent".to_string()))
            .await
            .unwrap();
        let wrong = app
            .clone()
            .oneshot(form_post(
                Some(&cookie),
                format!("title=Rent&csrf_token={}", generate_token()),
            ))
            .await
            .unwrap();

        assert_eq!(missing.status(), StatusCode::FORBIDDEN);
        assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn token_from_another_session_is_forbidden() {
        let app = app();
        let (_, stolen) = session(&app).await;

        let response = app
            .oneshot(form_post(None, format!("title=Rent&csrf_token={stolen}")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn safe_methods_are_not_checked() {
        let app = app();

        let response = app
            .oneshot(HttpRequest::builder().uri("/token").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
