//! Resource locators and the lazy page stream over GitHub list endpoints.

use std::fmt;

use serde_json::Value;

use super::client::GitHubApi;
use super::error::GitHubError;
use crate::models::ResourceKind;

/// Identifies one GitHub list endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocator {
    /// `GET /user/orgs`
    UserOrganizations,
    /// `GET /orgs/{org}/repos`
    OrganizationRepositories { org: String },
    /// `GET /repos/{owner}/{repo}/commits`
    RepositoryCommits { owner: String, repo: String },
    /// `GET /repos/{owner}/{repo}/issues`
    RepositoryIssues { owner: String, repo: String },
    /// `GET /repos/{owner}/{repo}/pulls?state=all`
    RepositoryPulls { owner: String, repo: String },
}

impl ResourceLocator {
    /// Locator for a repository-scoped kind. Returns `None` for organizations and repositories.
    pub fn for_repository(kind: ResourceKind, owner: &str, repo: &str) -> Option<Self> {
        let (owner, repo) = (owner.to_string(), repo.to_string());
        match kind {
            ResourceKind::Commits => Some(ResourceLocator::RepositoryCommits { owner, repo }),
            ResourceKind::Issues => Some(ResourceLocator::RepositoryIssues { owner, repo }),
            ResourceKind::PullRequests => Some(ResourceLocator::RepositoryPulls { owner, repo }),
            ResourceKind::Organizations | ResourceKind::Repositories => None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceLocator::UserOrganizations => ResourceKind::Organizations,
            ResourceLocator::OrganizationRepositories { .. } => ResourceKind::Repositories,
            ResourceLocator::RepositoryCommits { .. } => ResourceKind::Commits,
            ResourceLocator::RepositoryIssues { .. } => ResourceKind::Issues,
            ResourceLocator::RepositoryPulls { .. } => ResourceKind::PullRequests,
        }
    }

    pub fn path_segments(&self) -> Vec<String> {
        match self {
            ResourceLocator::UserOrganizations => vec!["user".into(), "orgs".into()],
            ResourceLocator::OrganizationRepositories { org } => {
                vec!["orgs".into(), org.clone(), "repos".into()]
            }
            ResourceLocator::RepositoryCommits { owner, repo } => {
                vec!["repos".into(), owner.clone(), repo.clone(), "commits".into()]
            }
            ResourceLocator::RepositoryIssues { owner, repo } => {
                vec!["repos".into(), owner.clone(), repo.clone(), "issues".into()]
            }
            ResourceLocator::RepositoryPulls { owner, repo } => {
                vec!["repos".into(), owner.clone(), repo.clone(), "pulls".into()]
            }
        }
    }

    /// Query pairs sent before `per_page`/`page`.
    pub fn extra_query(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ResourceLocator::RepositoryPulls { .. } => &[("state", "all")],
            _ => &[],
        }
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path_segments().join("/"))?;
        for (i, (key, value)) in self.extra_query().iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, key, value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Exhausted,
    Faulted,
}

/// Single-use sequence of pages for one locator.
///
/// `advance` yields `Ok(Some(page))` for each non-empty page, `Ok(None)` once an
/// empty page is seen, and `Err` when a request fails. After `None` or `Err`
/// every later call returns `Ok(None)`.
pub struct PageStream<'a> {
    api: &'a dyn GitHubApi,
    locator: ResourceLocator,
    next_page: u32,
    pages_fetched: u32,
    state: StreamState,
}

/// Start a fresh page stream at page 1.
pub fn fetch_pages<'a>(api: &'a dyn GitHubApi, locator: ResourceLocator) -> PageStream<'a> {
    PageStream {
        api,
        locator,
        next_page: 1,
        pages_fetched: 0,
        state: StreamState::Open,
    }
}

impl PageStream<'_> {
    pub async fn advance(&mut self) -> Result<Option<Vec<Value>>, GitHubError> {
        if self.state != StreamState::Open {
            return Ok(None);
        }

        let page = self.next_page;
        match self.api.fetch_page(&self.locator, page).await {
            Ok(records) => {
                self.pages_fetched += 1;
                metrics::counter!(
                    "github_sync_pages_fetched_total",
                    "kind" => self.locator.kind().as_str()
                )
                .increment(1);

                if records.is_empty() {
                    self.state = StreamState::Exhausted;
                    Ok(None)
                } else {
                    self.next_page += 1;
                    Ok(Some(records))
                }
            }
            Err(err) => {
                tracing::warn!(locator = %self.locator, page, error = %err, "Page fetch failed");
                self.state = StreamState::Faulted;
                Err(err)
            }
        }
    }

    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    /// Number of successful page requests so far.
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn is_finished(&self) -> bool {
        self.state != StreamState::Open
    }
}
