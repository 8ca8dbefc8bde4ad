//! # Tests for Handlers
//!
//! Router-level tests against an in-memory SQLite database.

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::config::AppConfig;
use crate::models::ResourceKind;
use crate::repositories::{IntegrationUpsert, NaturalKey, RecordFields};
use crate::server::{AppState, create_app};

async fn test_state() -> AppState {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let config = AppConfig {
        crypto_key: Some(vec![7u8; 32]),
        ..AppConfig::default()
    };
    AppState::new(config, db).expect("Failed to build app state")
}

async fn get(state: &AppState, uri: &str) -> (StatusCode, Value) {
    let response = create_app(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn seed_commit(state: &AppState, sha: &str, message: &str) {
    let payload = json!({ "sha": sha, "commit": { "message": message } });
    state
        .records
        .upsert(
            &NaturalKey {
                collection: ResourceKind::Commits,
                user_id: 42,
                natural_id: sha.to_string(),
            },
            RecordFields {
                org_id: Some(1),
                repo_id: Some(10),
                payload: payload.as_object().cloned().unwrap(),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_root_returns_service_info() {
    let state = test_state().await;
    let (status, body) = get(&state, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "github-sync");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_healthz_reports_ok_with_live_database() {
    let state = test_state().await;
    let (status, body) = get(&state, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_integration_without_code_is_rejected() {
    let state = test_state().await;

    let (status, body) = get(&state, "/integration").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, _) = get(&state, "/integration?code=%20%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_records_paginates_and_reports_meta() {
    let state = test_state().await;
    for i in 0..3 {
        seed_commit(&state, &format!("sha{}", i), "fix things").await;
    }

    let (status, body) = get(&state, "/commits?page=2&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["meta"]["total_docs"], 3);
    assert_eq!(body["meta"]["total_pages"], 2);
    assert_eq!(body["meta"]["has_prev_page"], true);
    assert_eq!(body["meta"]["has_next_page"], false);
    assert_eq!(body["meta"]["prev_page"], 1);

    let (status, body) = get(&state, "/issues").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total_docs"], 0);
}

#[tokio::test]
async fn test_list_records_bounds_page_number() {
    let state = test_state().await;
    seed_commit(&state, "sha0", "fix things").await;

    let (status, body) = get(&state, "/commits?page=18446744073709551615").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let uri = format!("/commits?page={}&limit=100", super::records::MAX_PAGE);
    let (status, body) = get(&state, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
    assert_eq!(body["meta"]["total_docs"], 1);
}

#[tokio::test]
async fn test_list_records_applies_filter_model() {
    let state = test_state().await;
    seed_commit(&state, "aaa", "Fix login bug").await;
    seed_commit(&state, "bbb", "Add docs").await;

    // {"commit.message":{"filterType":"text","type":"contains","filter":"LOGIN"}}
    let uri = "/commits?filterModel=%7B%22commit.message%22%3A%7B%22filterType%22%3A%22text%22%2C%22type%22%3A%22contains%22%2C%22filter%22%3A%22LOGIN%22%7D%7D";
    let (status, body) = get(&state, uri).await;

    assert_eq!(status, StatusCode::OK);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["natural_id"], "aaa");
}

#[tokio::test]
async fn test_list_records_rejects_malformed_filter_model() {
    let state = test_state().await;

    let (status, body) = get(&state, "/commits?filterModel=not-json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_unknown_resource_is_not_found() {
    let state = test_state().await;
    let (status, _) = get(&state, "/gists").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_text_search() {
    let state = test_state().await;
    seed_commit(&state, "aaa", "Refactor Parser").await;
    seed_commit(&state, "bbb", "Bump version").await;

    let (status, body) = get(&state, "/commits/textSearch?text=parser").await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["natural_id"], "aaa");

    let (status, body) = get(&state, "/commits/textSearch").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing search query");
}

#[tokio::test]
async fn test_sync_status_and_logout() {
    let state = test_state().await;

    let (status, _) = get(&state, "/integration/checkSyncStatus?userId=42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state
        .integrations
        .save(IntegrationUpsert {
            user_id: 42,
            username: "octocat",
            access_token: "gho_secret",
            in_progress: true,
            last_sync: None,
        })
        .await
        .unwrap();
    seed_commit(&state, "aaa", "kept after logout").await;

    let (status, body) = get(&state, "/integration/checkSyncStatus?userId=42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "octocat");
    assert_eq!(body["in_progress"], true);
    assert!(body["last_sync"].is_null());
    assert!(body.get("access_token").is_none());

    let (status, body) = get(&state, "/integration/logout?userId=42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");

    let (status, body) = get(&state, "/integration/logout?userId=42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");

    assert_eq!(
        state
            .records
            .count(ResourceKind::Commits, Some(42))
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_sync_status_requires_numeric_user_id() {
    let state = test_state().await;
    let (status, _) = get(&state, "/integration/checkSyncStatus?userId=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
