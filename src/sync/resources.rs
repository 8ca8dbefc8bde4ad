//! Per-kind resource sync: drain a page stream under a cap and upsert each record.

use serde_json::Value;
use tracing::instrument;

use super::context::ParentContext;
use super::error::SyncError;
use crate::config::SyncConfig;
use crate::github::{GitHubApi, fetch_pages};
use crate::models::{ResourceKind, github_record};
use crate::repositories::{GithubRecordRepository, NaturalKey, RecordFields};

/// Per-kind ceilings on records processed in one run. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCaps {
    pub organizations: Option<usize>,
    pub repositories: Option<usize>,
    pub commits: Option<usize>,
    pub issues: Option<usize>,
    pub pull_requests: Option<usize>,
}

impl Default for SyncCaps {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncCaps {
    fn from(config: &SyncConfig) -> Self {
        Self {
            organizations: None,
            repositories: None,
            commits: Some(config.commits_cap),
            issues: Some(config.issues_cap),
            pull_requests: Some(config.pulls_cap),
        }
    }
}

impl SyncCaps {
    pub fn for_kind(&self, kind: ResourceKind) -> Option<usize> {
        match kind {
            ResourceKind::Organizations => self.organizations,
            ResourceKind::Repositories => self.repositories,
            ResourceKind::Commits => self.commits,
            ResourceKind::Issues => self.issues,
            ResourceKind::PullRequests => self.pull_requests,
        }
    }
}

/// GitHub lists pull requests on the issues endpoint too; those carry a non-null `pull_request`.
pub fn is_pull_request_shadow(record: &Value) -> bool {
    record
        .get("pull_request")
        .is_some_and(|marker| !marker.is_null())
}

fn should_skip(kind: ResourceKind, record: &Value) -> bool {
    kind == ResourceKind::Issues && is_pull_request_shadow(record)
}

fn natural_id(kind: ResourceKind, record: &Value) -> Result<String, SyncError> {
    let field = kind.natural_key_field();
    match record.get(field) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(SyncError::MalformedRecord { kind, field }),
    }
}

/// Sync one resource kind under `parent`.
///
/// Records are processed page by page. Skipped records count toward the cap,
/// and the cap is checked after each full page, so the last page is never
/// truncated. Any upsert or fetch failure aborts this resource only; records
/// already stored stay stored.
#[instrument(
    name = "sync_resource",
    skip_all,
    fields(kind = %kind, parent = %parent, user_id = user_id)
)]
pub async fn sync_resource(
    api: &dyn GitHubApi,
    store: &GithubRecordRepository,
    user_id: i64,
    parent: &ParentContext,
    kind: ResourceKind,
    caps: &SyncCaps,
) -> Result<Vec<github_record::Model>, SyncError> {
    let locator = parent
        .locator(kind)
        .ok_or_else(|| SyncError::InvalidParent {
            kind,
            parent: parent.clone(),
        })?;
    let cap = caps.for_kind(kind);

    let mut stream = fetch_pages(api, locator);
    let mut processed = 0usize;
    let mut skipped = 0usize;
    let mut synced = Vec::new();

    loop {
        let page = match stream.advance().await {
            Ok(Some(page)) => page,
            Ok(None) => break,
            Err(source) => {
                return Err(SyncError::FetchFaulted {
                    locator: stream.locator().to_string(),
                    source,
                });
            }
        };

        for record in page {
            processed += 1;
            if should_skip(kind, &record) {
                skipped += 1;
                continue;
            }

            let key = NaturalKey {
                collection: kind,
                user_id,
                natural_id: natural_id(kind, &record)?,
            };
            let Value::Object(payload) = record else {
                return Err(SyncError::MalformedRecord {
                    kind,
                    field: kind.natural_key_field(),
                });
            };
            let fields = RecordFields {
                org_id: parent.org_id(),
                repo_id: parent.repo_id(),
                payload,
            };

            synced.push(store.upsert(&key, fields).await?);
            metrics::counter!("github_sync_records_upserted_total", "kind" => kind.as_str())
                .increment(1);
        }

        if cap.is_some_and(|cap| processed >= cap) {
            tracing::debug!(processed, ?cap, "Resource cap reached");
            break;
        }
    }

    tracing::info!(
        processed,
        skipped,
        stored = synced.len(),
        pages = stream.pages_fetched(),
        "Resource sync complete"
    );
    Ok(synced)
}
