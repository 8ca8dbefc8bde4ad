use thiserror::Error;

use super::context::ParentContext;
use crate::github::GitHubError;
use crate::models::ResourceKind;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authorization code exchange failed: {0}")]
    AuthExchangeFailed(String),

    #[error("failed to resolve the authenticated GitHub identity: {0}")]
    IdentityResolutionFailed(#[source] GitHubError),

    #[error("{kind} sync under {parent} failed: {source}")]
    ResourceSyncFailed {
        kind: ResourceKind,
        parent: ParentContext,
        #[source]
        source: Box<SyncError>,
    },

    #[error("fetching {locator} failed: {source}")]
    FetchFaulted {
        locator: String,
        #[source]
        source: GitHubError,
    },

    #[error("{kind} record is missing its natural key '{field}'")]
    MalformedRecord {
        kind: ResourceKind,
        field: &'static str,
    },

    #[error("{kind} cannot be synced under {parent}")]
    InvalidParent {
        kind: ResourceKind,
        parent: ParentContext,
    },

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("a sync is already running for user {user_id}")]
    AlreadyRunning { user_id: i64 },

    #[error("sync job aborted: {0}")]
    JobAborted(String),
}

impl SyncError {
    /// Status carried by the terminal `failed` event.
    pub fn event_status(&self) -> u16 {
        match self {
            SyncError::AuthExchangeFailed(_) => 400,
            SyncError::AlreadyRunning { .. } => 409,
            SyncError::IdentityResolutionFailed(_) => 502,
            _ => 500,
        }
    }
}
