//! Sync orchestrator: authenticate, walk organizations → repositories →
//! {commits, issues, pull requests} strictly in order, then finalize the
//! integration record.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;

use super::context::ParentContext;
use super::error::SyncError;
use super::resources::{SyncCaps, sync_resource};
use crate::config::AppConfig;
use crate::github::{GitHubApi, GitHubClient, GitHubError, GitHubUser, OAuthApp};
use crate::models::{ResourceKind, github_record};
use crate::repositories::{GithubRecordRepository, IntegrationRepository, IntegrationUpsert};

/// Kinds synced under each repository, in order.
pub const REPOSITORY_CHILDREN: [ResourceKind; 3] = [
    ResourceKind::Commits,
    ResourceKind::Issues,
    ResourceKind::PullRequests,
];

/// Authenticated identity plus a client bound to its token.
#[derive(Clone)]
pub struct SyncSession {
    pub identity: GitHubUser,
    pub token: String,
    pub client: Arc<dyn GitHubApi>,
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Records stored per kind in one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SyncCounts {
    pub organizations: usize,
    pub repositories: usize,
    pub commits: usize,
    pub issues: usize,
    pub pull_requests: usize,
}

impl SyncCounts {
    pub fn add(&mut self, kind: ResourceKind, count: usize) {
        match kind {
            ResourceKind::Organizations => self.organizations += count,
            ResourceKind::Repositories => self.repositories += count,
            ResourceKind::Commits => self.commits += count,
            ResourceKind::Issues => self.issues += count,
            ResourceKind::PullRequests => self.pull_requests += count,
        }
    }
}

/// One isolated resource failure.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResourceFailure {
    pub kind: ResourceKind,
    pub parent: ParentContext,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct SyncReport {
    pub counts: SyncCounts,
    pub failures: Vec<ResourceFailure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Integration state after a finished run. Carries the plaintext token.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IntegrationSummary {
    pub user_id: i64,
    pub username: String,
    pub access_token: String,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_sync: Option<DateTimeWithTimeZone>,
    #[schema(value_type = String, format = DateTime)]
    pub connected_at: DateTimeWithTimeZone,
    pub in_progress: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncOutcome {
    pub integration: IntegrationSummary,
    pub report: SyncReport,
}

/// Builds the per-job GitHub client.
#[derive(Debug, Clone)]
pub struct GitHubClientFactory {
    http: reqwest::Client,
    api_base: String,
    user_agent: String,
}

impl GitHubClientFactory {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            user_agent: user_agent.into(),
        }
    }

    pub fn client(&self, token: &str) -> Result<GitHubClient, GitHubError> {
        GitHubClient::new(self.http.clone(), &self.api_base, token, &self.user_agent)
    }
}

#[derive(Debug, Clone)]
pub struct SyncOrchestrator {
    oauth: OAuthApp,
    clients: GitHubClientFactory,
    records: GithubRecordRepository,
    integrations: IntegrationRepository,
    caps: SyncCaps,
}

impl SyncOrchestrator {
    pub fn new(
        oauth: OAuthApp,
        clients: GitHubClientFactory,
        records: GithubRecordRepository,
        integrations: IntegrationRepository,
        caps: SyncCaps,
    ) -> Self {
        Self {
            oauth,
            clients,
            records,
            integrations,
            caps,
        }
    }

    /// Wire an orchestrator from application config.
    pub fn from_config(
        config: &AppConfig,
        records: GithubRecordRepository,
        integrations: IntegrationRepository,
    ) -> Self {
        let http = reqwest::Client::new();
        let oauth = OAuthApp::new(
            http.clone(),
            config.github_oauth_base.clone(),
            config.github_client_id.clone().unwrap_or_default(),
            config.github_client_secret.clone().unwrap_or_default(),
        );
        let clients = GitHubClientFactory::new(
            http,
            config.github_api_base.clone(),
            config.github_user_agent.clone(),
        );
        Self::new(oauth, clients, records, integrations, SyncCaps::from(&config.sync))
    }

    /// Exchange the code for a token and resolve the identity behind it.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, code: &str) -> Result<SyncSession, SyncError> {
        let token = self.oauth.exchange_code(code).await.map_err(|err| match err {
            GitHubError::OAuth(message) => SyncError::AuthExchangeFailed(message),
            other => SyncError::AuthExchangeFailed(other.to_string()),
        })?;

        let client = self
            .clients
            .client(&token)
            .map_err(SyncError::IdentityResolutionFailed)?;
        let identity = client
            .authenticated_user()
            .await
            .map_err(SyncError::IdentityResolutionFailed)?;

        tracing::info!(user_id = identity.id, login = %identity.login, "GitHub identity resolved");
        Ok(SyncSession {
            identity,
            token,
            client: Arc::new(client),
        })
    }

    /// Persist the integration with the in-progress flag set.
    pub async fn mark_in_progress(&self, session: &SyncSession) -> Result<(), SyncError> {
        self.integrations
            .save(IntegrationUpsert {
                user_id: session.identity.id,
                username: &session.identity.login,
                access_token: &session.token,
                in_progress: true,
                last_sync: None,
            })
            .await?;
        Ok(())
    }

    /// Walk the full hierarchy. Resource failures are isolated into the report.
    #[instrument(skip_all, fields(user_id = session.identity.id))]
    pub async fn sync_hierarchy(&self, session: &SyncSession) -> SyncReport {
        let api = session.client.as_ref();
        let user_id = session.identity.id;
        let mut report = SyncReport::default();

        let root = ParentContext::User {
            user_id,
            login: session.identity.login.clone(),
        };
        let Some(organizations) = self
            .run_resource(api, user_id, &root, ResourceKind::Organizations, &mut report)
            .await
        else {
            return report;
        };

        for organization in &organizations {
            let Some(org) = ParentContext::organization(organization) else {
                tracing::warn!(natural_id = %organization.natural_id, "Organization without login skipped");
                continue;
            };
            let Some(repositories) = self
                .run_resource(api, user_id, &org, ResourceKind::Repositories, &mut report)
                .await
            else {
                continue;
            };

            for repository in &repositories {
                let Some(repo) = ParentContext::repository(&org, repository) else {
                    tracing::warn!(natural_id = %repository.natural_id, "Repository without owner or name skipped");
                    continue;
                };
                for kind in REPOSITORY_CHILDREN {
                    self.run_resource(api, user_id, &repo, kind, &mut report)
                        .await;
                }
            }
        }

        report
    }

    async fn run_resource(
        &self,
        api: &dyn GitHubApi,
        user_id: i64,
        parent: &ParentContext,
        kind: ResourceKind,
        report: &mut SyncReport,
    ) -> Option<Vec<github_record::Model>> {
        match sync_resource(api, &self.records, user_id, parent, kind, &self.caps).await {
            Ok(records) => {
                report.counts.add(kind, records.len());
                Some(records)
            }
            Err(source) => {
                let failure = SyncError::ResourceSyncFailed {
                    kind,
                    parent: parent.clone(),
                    source: Box::new(source),
                };
                tracing::error!(error = %failure, "Resource sync failed");
                metrics::counter!("github_sync_resource_failures_total", "kind" => kind.as_str())
                    .increment(1);
                report.failures.push(ResourceFailure {
                    kind,
                    parent: parent.clone(),
                    error: failure.to_string(),
                });
                None
            }
        }
    }

    /// Store the latest token and sync time and clear the in-progress flag.
    pub async fn finalize(&self, session: &SyncSession) -> Result<IntegrationSummary, SyncError> {
        let saved = self
            .integrations
            .save(IntegrationUpsert {
                user_id: session.identity.id,
                username: &session.identity.login,
                access_token: &session.token,
                in_progress: false,
                last_sync: Some(Utc::now().into()),
            })
            .await?;

        Ok(IntegrationSummary {
            user_id: saved.user_id,
            username: saved.username,
            access_token: session.token.clone(),
            last_sync: saved.last_sync,
            connected_at: saved.connected_at,
            in_progress: saved.in_progress != 0,
        })
    }

    /// All steps in sequence, without the job runner's guard or events.
    pub async fn run_sync(&self, code: &str) -> Result<SyncOutcome, SyncError> {
        let session = self.authenticate(code).await?;
        self.mark_in_progress(&session).await?;
        let report = self.sync_hierarchy(&session).await;
        let integration = self.finalize(&session).await?;
        Ok(SyncOutcome {
            integration,
            report,
        })
    }
}
