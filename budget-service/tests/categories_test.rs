//! Category management against a real database.

mod common;

use budget_service::models::{BudgetInput, BudgetWrite, EntryInput, EntryType};
use budget_service::services::filters::EntryFilter;
use chrono::NaiveDate;
use common::{location, spawn_app, unique_email, TestApp};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use uuid::Uuid;

async fn signed_in() -> (TestApp, Uuid) {
    let app = spawn_app().await;
    let email = unique_email();
    app.register(&email).await;
    let user_id = app.user_id(&email).await;
    (app, user_id)
}

#[tokio::test]
#[ignore] // Requires database
async fn names_are_unique_per_user() {
    let (app, _) = signed_in().await;

    let created = app.post_form("/categories", &[("name", "Travel")]).await;
    assert_eq!(created.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&created), "/categories");

    let duplicate = app.post_form("/categories", &[("name", "Travel")]).await;
    assert_eq!(duplicate.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(duplicate
        .text()
        .await
        .unwrap()
        .contains("You already have a category with this name."));

    let other = app.second_session();
    other.register(&unique_email()).await;
    let theirs = other.post_form("/categories", &[("name", "Travel")]).await;
    assert_eq!(theirs.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
#[ignore]
async fn deleting_a_category_keeps_entries_and_drops_budgets() {
    let (app, user_id) = signed_in().await;
    let month = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    let category = app.db.create_category(user_id, "Hobbies").await.unwrap();

    app.db
        .create_entry(
            user_id,
            &EntryInput {
                title: "Paint".to_string(),
                amount: Decimal::new(2500, 2),
                entry_date: NaiveDate::from_ymd_opt(2024, 4, 3).unwrap(),
                entry_type: EntryType::Expense,
                category_id: Some(category.category_id),
                notes: String::new(),
            },
        )
        .await
        .unwrap();
    let saved = app
        .db
        .set_budget(
            user_id,
            &BudgetInput {
                month,
                category_id: Some(category.category_id),
                amount: Decimal::new(100, 0),
            },
        )
        .await
        .unwrap();
    assert!(matches!(saved, BudgetWrite::Saved(_)));

    let response = app
        .post_form(&format!("/categories/{}/delete", category.category_id), &[])
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let entries = app
        .db
        .filtered_entries(user_id, &EntryFilter::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].category_id, None);
    assert_eq!(entries[0].category_label(), "Uncategorized");

    let budgets = app.db.list_budgets(user_id, month).await.unwrap();
    assert!(budgets.is_empty());
}

#[tokio::test]
#[ignore]
async fn cannot_touch_another_users_category() {
    let (owner, owner_id) = signed_in().await;
    let category = owner.db.create_category(owner_id, "Mine").await.unwrap();

    let intruder = owner.second_session();
    intruder.register(&unique_email()).await;

    let rename = intruder
        .post_form(
            &format!("/categories/{}", category.category_id),
            &[("name", "Stolen")],
        )
        .await;
    assert_eq!(rename.status(), StatusCode::NOT_FOUND);

    let delete = intruder
        .post_form(&format!("/categories/{}/delete", category.category_id), &[])
        .await;
    assert_eq!(delete.status(), StatusCode::NOT_FOUND);

    let kept = owner
        .db
        .get_category(owner_id, category.category_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.name, "Mine");
}
