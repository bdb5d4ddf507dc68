//! Forgot/reset password flow against a real database.

mod common;

use budget_service::utils::tokens::{generate_token, hash_token};
use chrono::{Duration, Utc};
use common::{location, spawn_app, unique_email, TestApp, TEST_PASSWORD};
use reqwest::StatusCode;

const NEW_PASSWORD: &str = "a much better passphrase";

async fn request_reset(app: &TestApp, email: &str) -> reqwest::Response {
    app.post_form("/forgot-password", &[("email", email)]).await
}

/// Path and query of the emailed link.
fn link_path(link: &str) -> &str {
    let start = link.find("/reset-password").expect("reset path in link");
    &link[start..]
}

fn token_of(link: &str) -> &str {
    link.split("token=").nth(1).expect("token in link")
}

async fn log_in(app: &TestApp, email: &str, password: &str) -> reqwest::Response {
    app.post_form("/login", &[("email", email), ("password", password)])
        .await
}

#[tokio::test]
#[ignore] // Requires database
async fn reset_link_sets_a_new_password_once() {
    let app = spawn_app().await;
    let email = unique_email();
    app.register(&email).await;

    let guest = app.second_session();
    let response = request_reset(&guest, &email).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("If an account exists"));

    let link = app.mailer.last_link_to(&email).expect("reset email sent");
    let page = guest.get(link_path(&link)).await;
    assert_eq!(page.status(), StatusCode::OK);

    let reset = guest
        .post_form(
            "/reset-password",
            &[
                ("token", token_of(&link)),
                ("new_password", NEW_PASSWORD),
                ("confirm_password", NEW_PASSWORD),
            ],
        )
        .await;
    assert_eq!(reset.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&reset), "/login?reset=done");

    let old = log_in(&app.second_session(), &email, TEST_PASSWORD).await;
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);
    let new = log_in(&app.second_session(), &email, NEW_PASSWORD).await;
    assert_eq!(new.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&new), "/dashboard");

    let reused = guest
        .post_form(
            "/reset-password",
            &[
                ("token", token_of(&link)),
                ("new_password", "yet another passphrase"),
                ("confirm_password", "yet another passphrase"),
            ],
        )
        .await;
    assert_eq!(reused.status(), StatusCode::BAD_REQUEST);
    assert!(reused.text().await.unwrap().contains("invalid or has expired"));
}

#[tokio::test]
#[ignore]
async fn unknown_email_gets_the_same_answer_and_no_mail() {
    let app = spawn_app().await;
    let email = unique_email();
    app.register(&email).await;
    let guest = app.second_session();

    let known = request_reset(&guest, &email).await;
    let known_status = known.status();
    let known_html = known.text().await.unwrap();

    let stranger = unique_email();
    let unknown = request_reset(&guest, &stranger).await;
    assert_eq!(unknown.status(), known_status);
    let unknown_html = unknown.text().await.unwrap();
    assert!(unknown_html.contains("If an account exists"));
    assert_eq!(
        known_html.contains("If an account exists"),
        unknown_html.contains("If an account exists")
    );

    assert!(app.mailer.last_link_to(&stranger).is_none());
    assert_eq!(
        app.mailer.sent().iter().filter(|m| m.to == email).count(),
        1
    );
}

#[tokio::test]
#[ignore]
async fn expired_token_is_rejected() {
    let app = spawn_app().await;
    let email = unique_email();
    app.register(&email).await;
    let user_id = app.user_id(&email).await;

    let token = generate_token();
    app.db
        .create_password_reset(user_id, &hash_token(&token), Utc::now() - Duration::minutes(1))
        .await
        .unwrap();

    let guest = app.second_session();
    let page = guest.get(&format!("/reset-password?token={token}")).await;
    assert_eq!(page.status(), StatusCode::BAD_REQUEST);

    let reset = guest
        .post_form(
            "/reset-password",
            &[
                ("token", token.as_str()),
                ("new_password", NEW_PASSWORD),
                ("confirm_password", NEW_PASSWORD),
            ],
        )
        .await;
    assert_eq!(reset.status(), StatusCode::BAD_REQUEST);

    let old = log_in(&guest, &email, TEST_PASSWORD).await;
    assert_eq!(old.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
#[ignore]
async fn a_new_request_replaces_the_previous_link() {
    let app = spawn_app().await;
    let email = unique_email();
    app.register(&email).await;
    let guest = app.second_session();

    request_reset(&guest, &email).await;
    let first = app.mailer.last_link_to(&email).unwrap();
    request_reset(&guest, &email).await;
    let second = app.mailer.last_link_to(&email).unwrap();
    assert_ne!(first, second);

    let stale = guest.get(link_path(&first)).await;
    assert_eq!(stale.status(), StatusCode::BAD_REQUEST);
    let fresh = guest.get(link_path(&second)).await;
    assert_eq!(fresh.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore]
async fn mismatched_passwords_keep_the_link_usable() {
    let app = spawn_app().await;
    let email = unique_email();
    app.register(&email).await;
    let guest = app.second_session();

    request_reset(&guest, &email).await;
    let link = app.mailer.last_link_to(&email).unwrap();

    let mismatch = guest
        .post_form(
            "/reset-password",
            &[
                ("token", token_of(&link)),
                ("new_password", NEW_PASSWORD),
                ("confirm_password", "something else entirely"),
            ],
        )
        .await;
    assert_eq!(mismatch.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(mismatch.text().await.unwrap().contains("Passwords do not match."));

    let page = guest.get(link_path(&link)).await;
    assert_eq!(page.status(), StatusCode::OK);
}
