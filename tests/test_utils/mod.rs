//! Test utilities for database and GitHub API testing.
//!
//! In-memory SQLite databases with migrations applied, plus wiremock helpers
//! that stand in for GitHub's OAuth and REST endpoints.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use github_sync::config::AppConfig;
use github_sync::crypto::CryptoKey;
use github_sync::repositories::{GithubRecordRepository, IntegrationRepository};
use github_sync::sync::{
    BroadcastPublisher, EventPublisher, GitHubClientFactory, JobRunner, SyncCaps, SyncOrchestrator,
};
use github_sync::github::OAuthApp;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_USER_ID: i64 = 42;
pub const TEST_LOGIN: &str = "octocat";
pub const TEST_TOKEN: &str = "gho_test_token";
pub const TEST_CODE: &str = "good-code";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Sets up an in-memory SQLite database with all migrations applied and returns an Arc.
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    let db = setup_test_db().await?;
    Ok(Arc::new(db))
}

pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new(vec![7u8; 32]).expect("32-byte test key")
}

/// Config pointing both GitHub hosts at `server`.
pub fn test_config(server: &MockServer) -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        crypto_key: Some(vec![7u8; 32]),
        github_client_id: Some("client-id".to_string()),
        github_client_secret: Some("client-secret".to_string()),
        github_oauth_base: server.uri(),
        github_api_base: server.uri(),
        ..AppConfig::default()
    }
}

pub struct SyncHarness {
    pub db: Arc<DatabaseConnection>,
    pub records: GithubRecordRepository,
    pub integrations: IntegrationRepository,
    pub orchestrator: Arc<SyncOrchestrator>,
}

/// Orchestrator wired to `server` with the given caps.
pub async fn sync_harness(server: &MockServer, caps: SyncCaps) -> Result<SyncHarness> {
    let db = setup_test_db_arc().await?;
    let records = GithubRecordRepository::new(db.clone());
    let integrations = IntegrationRepository::new(db.clone(), test_crypto_key());

    let http = reqwest::Client::new();
    let oauth = OAuthApp::new(http.clone(), server.uri(), "client-id", "client-secret");
    let clients = GitHubClientFactory::new(http, server.uri(), "github-sync-test");
    let orchestrator = Arc::new(SyncOrchestrator::new(
        oauth,
        clients,
        records.clone(),
        integrations.clone(),
        caps,
    ));

    Ok(SyncHarness {
        db,
        records,
        integrations,
        orchestrator,
    })
}

/// Job runner publishing into a fresh broadcast channel.
pub fn job_runner(harness: &SyncHarness, reject_concurrent: bool) -> (JobRunner, BroadcastPublisher) {
    let events = BroadcastPublisher::default();
    let publisher: Arc<dyn EventPublisher> = Arc::new(events.clone());
    let runner = JobRunner::new(harness.orchestrator.clone(), publisher, reject_concurrent);
    (runner, events)
}

/// Token exchange for `TEST_CODE` plus the authenticated user lookup.
pub async fn mount_identity(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .and(body_string_contains(format!("code={}", TEST_CODE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": TEST_TOKEN,
            "token_type": "bearer",
            "scope": "repo,read:org"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        })))
        .with_priority(10)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/user"))
        .and(header("authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": TEST_USER_ID, "login": TEST_LOGIN })),
        )
        .mount(server)
        .await;
}

/// Any list endpoint without a more specific mock returns an empty page.
pub async fn mount_empty_fallback(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .with_priority(u8::MAX)
        .mount(server)
        .await;
}

/// Serve `records` at `list_path` in pages of `page_size`, starting at page 1.
pub async fn mount_pages(server: &MockServer, list_path: &str, records: Vec<Value>, page_size: usize) {
    for (index, chunk) in records.chunks(page_size).enumerate() {
        Mock::given(method("GET"))
            .and(path(list_path))
            .and(query_param("page", (index + 1).to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(chunk.to_vec())))
            .mount(server)
            .await;
    }
}

pub fn org(id: i64, login: &str) -> Value {
    json!({ "id": id, "login": login, "description": format!("{} org", login) })
}

pub fn repo(id: i64, owner: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "full_name": format!("{}/{}", owner, name),
        "private": false,
        "owner": { "login": owner }
    })
}

pub fn commit(sha: &str, message: &str) -> Value {
    json!({
        "sha": sha,
        "commit": {
            "message": message,
            "author": { "name": "Ada", "date": "2024-03-05T10:00:00Z" }
        }
    })
}

pub fn issue(id: i64, title: &str) -> Value {
    json!({ "id": id, "number": id, "title": title, "state": "open" })
}

pub fn pull_request_shadow(id: i64, title: &str) -> Value {
    json!({
        "id": id,
        "number": id,
        "title": title,
        "pull_request": { "url": format!("https://api.github.com/pulls/{}", id) }
    })
}

/// Request paths GitHub saw, in arrival order, with consecutive repeats collapsed.
pub async fn request_path_sequence(server: &MockServer) -> Vec<String> {
    let mut paths: Vec<String> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.method.as_str() == "GET")
        .map(|request| request.url.path().to_string())
        .collect();
    paths.dedup();
    paths
}
