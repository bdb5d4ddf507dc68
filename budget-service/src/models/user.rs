use crate::middleware::csrf::session_token;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tower_sessions::Session;
use uuid::Uuid;

pub const SESSION_USER_ID: &str = "user_id";
pub const SESSION_EMAIL: &str = "email";
pub const SESSION_DISPLAY_NAME: &str = "display_name";

/// Stored account. `password_hash` is an argon2id PHC string.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl User {
    pub fn name(&self) -> &str {
        match &self.display_name {
            Some(name) if !name.is_empty() => name,
            _ => self.email.split('@').next().unwrap_or("User"),
        }
    }
}

/// Authenticated user context extracted from session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    /// The session's CSRF token, rendered into every form.
    #[serde(skip)]
    pub csrf_token: String,
}

impl AuthUser {
    pub fn name(&self) -> String {
        match &self.display_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.email.split('@').next().unwrap_or("User").to_string(),
        }
    }

    /// Stores the user in a freshly cycled session so a pre-login session id is never reused.
    pub async fn start_session(
        session: &Session,
        user: &User,
    ) -> Result<(), tower_sessions::session::Error> {
        session.cycle_id().await?;
        session.insert(SESSION_USER_ID, user.user_id).await?;
        session.insert(SESSION_EMAIL, &user.email).await?;
        session
            .insert(SESSION_DISPLAY_NAME, &user.display_name)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
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

        let user_id: Option<Uuid> = session.get(SESSION_USER_ID).await.unwrap_or(None);
        let email: Option<String> = session.get(SESSION_EMAIL).await.unwrap_or(None);

        match (user_id, email) {
            (Some(user_id), Some(email)) => {
                let display_name: Option<String> = session
                    .get::<Option<String>>(SESSION_DISPLAY_NAME)
                    .await
                    .unwrap_or(None)
                    .flatten();
                let csrf_token = session_token(&session).await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to load CSRF token");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                })?;

                Ok(AuthUser {
                    user_id,
                    email,
                    display_name,
                    csrf_token,
                })
            }
            _ => Err(Redirect::to("/login").into_response()),
        }
    }
}

/// Resolves the session user when present without forcing a login redirect.
pub async fn current_user(session: &Session) -> Option<AuthUser> {
    let user_id: Uuid = session.get(SESSION_USER_ID).await.ok().flatten()?;
    let email: String = session.get(SESSION_EMAIL).await.ok().flatten()?;
    let display_name = session
        .get::<Option<String>>(SESSION_DISPLAY_NAME)
        .await
        .ok()
        .flatten()
        .flatten();
    let csrf_token = session_token(session).await.ok()?;

    Some(AuthUser {
        user_id,
        email,
        display_name,
        csrf_token,
    })
}
