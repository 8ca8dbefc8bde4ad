//! GitHub API error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("OAuth authentication failed: {0}")]
    OAuth(String),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited by GitHub API (status {status}), resets at {reset:?}")]
    RateLimited {
        status: u16,
        reset: Option<DateTime<Utc>>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected response payload: {0}")]
    UnexpectedPayload(String),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl GitHubError {
    /// HTTP status returned by GitHub, when the failure carried one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            GitHubError::Api { status, .. } | GitHubError::RateLimited { status, .. } => {
                Some(*status)
            }
            GitHubError::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_is_exposed_for_http_failures() {
        let api = GitHubError::Api {
            status: 404,
            message: "Not Found".into(),
        };
        assert_eq!(api.upstream_status(), Some(404));

        let limited = GitHubError::RateLimited {
            status: 403,
            reset: None,
        };
        assert_eq!(limited.upstream_status(), Some(403));

        assert_eq!(GitHubError::OAuth("denied".into()).upstream_status(), None);
    }
}
