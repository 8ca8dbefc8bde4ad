//! GitHub REST client and OAuth app credentials.
//!
//! [`GitHubClient`] is constructed once per sync job with the user's access
//! token and threaded through the sync routines. There is no global client.

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Response, StatusCode, header};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::error::GitHubError;
use super::pagination::ResourceLocator;

/// Fixed page size for every list request.
pub const PAGE_SIZE: u32 = 100;

const ACCEPT_V3: &str = "application/vnd.github.v3+json";

/// Authenticated GitHub identity
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitHubUser {
    pub id: i64,
    pub login: String,
}

/// Read-only view of the GitHub REST API used by the sync engine.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// `GET /user`
    async fn authenticated_user(&self) -> Result<GitHubUser, GitHubError>;

    /// One page (1-based) of the list behind `locator`, as raw JSON records.
    async fn fetch_page(
        &self,
        locator: &ResourceLocator,
        page: u32,
    ) -> Result<Vec<Value>, GitHubError>;
}

#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: Url,
    token: String,
    user_agent: String,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base", &self.api_base.as_str())
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(
        http: reqwest::Client,
        api_base: &str,
        token: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Result<Self, GitHubError> {
        Ok(Self {
            http,
            api_base: Url::parse(api_base)?,
            token: token.into(),
            user_agent: user_agent.into(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GitHubError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| GitHubError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Response, GitHubError> {
        tracing::debug!(url = %url, "GitHub request");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, ACCEPT_V3)
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    async fn authenticated_user(&self) -> Result<GitHubUser, GitHubError> {
        let url = self.endpoint(&["user"])?;
        let response = self.get(url).await?;
        let body: Value = response.json().await?;
        serde_json::from_value(body)
            .map_err(|e| GitHubError::UnexpectedPayload(format!("user response: {}", e)))
    }

    async fn fetch_page(
        &self,
        locator: &ResourceLocator,
        page: u32,
    ) -> Result<Vec<Value>, GitHubError> {
        let segments = locator.path_segments();
        let segment_refs: Vec<&str> = segments.iter().map(String::as_str).collect();
        let mut url = self.endpoint(&segment_refs)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in locator.extra_query() {
                query.append_pair(key, value);
            }
            query
                .append_pair("per_page", &PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());
        }

        let response = self.get(url).await?;
        match response.json::<Value>().await? {
            Value::Array(records) => Ok(records),
            other => Err(GitHubError::UnexpectedPayload(format!(
                "expected a JSON array for {}, got {}",
                locator,
                json_type_name(&other)
            ))),
        }
    }
}

async fn error_from_response(response: Response) -> GitHubError {
    let status = response.status();
    let headers = response.headers();

    let remaining = headers
        .get("X-RateLimit-Remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let reset = headers
        .get("X-RateLimit-Reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0));

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && remaining == Some(0));
    if rate_limited {
        tracing::warn!(status = status.as_u16(), ?reset, "GitHub rate limit hit");
        return GitHubError::RateLimited {
            status: status.as_u16(),
            reset,
        };
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);

    GitHubError::Api {
        status: status.as_u16(),
        message,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Registered OAuth application used to exchange authorization codes.
#[derive(Clone)]
pub struct OAuthApp {
    http: reqwest::Client,
    oauth_base: String,
    client_id: String,
    client_secret: String,
}

impl std::fmt::Debug for OAuthApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthApp")
            .field("oauth_base", &self.oauth_base)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl OAuthApp {
    pub fn new(
        http: reqwest::Client,
        oauth_base: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            oauth_base: oauth_base.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String, GitHubError> {
        if code.trim().is_empty() {
            return Err(GitHubError::OAuth("authorization code is required".to_string()));
        }

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
        ];

        let response = self
            .http
            .post(format!(
                "{}/login/oauth/access_token",
                self.oauth_base.trim_end_matches('/')
            ))
            .header(header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| GitHubError::OAuth(format!("token exchange request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GitHubError::OAuth(format!(
                "Token exchange failed: {} - {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GitHubError::OAuth(format!("invalid token response: {}", e)))?;

        if let Some(error) = token.error {
            return Err(GitHubError::OAuth(token.error_description.unwrap_or(error)));
        }

        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GitHubError::OAuth("no access token returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GitHubClient {
        GitHubClient::new(reqwest::Client::new(), &server.uri(), "tok", "github-sync-test")
            .expect("valid base url")
    }

    #[tokio::test]
    async fn fetch_page_sends_auth_and_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/hello/pulls"))
            .and(query_param("state", "all"))
            .and(query_param("per_page", "100"))
            .and(query_param("page", "2"))
            .and(header_eq("authorization", "Bearer tok"))
            .and(header_eq("accept", ACCEPT_V3))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": 1}])))
            .expect(1)
            .mount(&server)
            .await;

        let locator = ResourceLocator::RepositoryPulls {
            owner: "octo".into(),
            repo: "hello".into(),
        };
        let page = client_for(&server).fetch_page(&locator, 2).await.unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn non_array_body_is_unexpected_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/orgs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_page(&ResourceLocator::UserOrganizations, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::UnexpectedPayload(_)));
    }

    #[tokio::test]
    async fn exhausted_rate_limit_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("X-RateLimit-Remaining", "0")
                    .insert_header("X-RateLimit-Reset", "1700000000"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).authenticated_user().await.unwrap_err();
        match err {
            GitHubError::RateLimited { status, reset } => {
                assert_eq!(status, 403);
                assert_eq!(reset.map(|r| r.timestamp()), Some(1_700_000_000));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn api_error_uses_github_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"message": "Bad credentials"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).authenticated_user().await.unwrap_err();
        match err {
            GitHubError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Bad credentials");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exchange_code_posts_form_and_returns_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(header_eq("accept", "application/json"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("client_id=cid"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "gho_1", "token_type": "bearer"})),
            )
            .mount(&server)
            .await;

        let app = OAuthApp::new(reqwest::Client::new(), server.uri(), "cid", "secret");
        assert_eq!(app.exchange_code("abc").await.unwrap(), "gho_1");
    }

    #[tokio::test]
    async fn exchange_code_surfaces_error_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": "bad_verification_code",
                "error_description": "The code passed is incorrect or expired."
            })))
            .mount(&server)
            .await;

        let app = OAuthApp::new(reqwest::Client::new(), server.uri(), "cid", "secret");
        let err = app.exchange_code("stale").await.unwrap_err();
        assert!(err.to_string().contains("incorrect or expired"));
    }

    #[tokio::test]
    async fn blank_code_is_rejected_without_a_request() {
        let app = OAuthApp::new(reqwest::Client::new(), "http://127.0.0.1:9", "cid", "secret");
        assert!(matches!(
            app.exchange_code("  ").await,
            Err(GitHubError::OAuth(_))
        ));
    }
}
