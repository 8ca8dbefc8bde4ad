//! Resource kinds mirrored from GitHub.
//!
//! A resource kind doubles as the storage collection name for its records.

use std::fmt;
use std::str::FromStr;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One of the five resource kinds a sync run mirrors.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[sea_orm(string_value = "organizations")]
    Organizations,
    #[sea_orm(string_value = "repositories")]
    Repositories,
    #[sea_orm(string_value = "commits")]
    Commits,
    #[sea_orm(string_value = "issues")]
    Issues,
    #[sea_orm(string_value = "pull_requests")]
    PullRequests,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Organizations,
        ResourceKind::Repositories,
        ResourceKind::Commits,
        ResourceKind::Issues,
        ResourceKind::PullRequests,
    ];

    /// Collection name used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Organizations => "organizations",
            ResourceKind::Repositories => "repositories",
            ResourceKind::Commits => "commits",
            ResourceKind::Issues => "issues",
            ResourceKind::PullRequests => "pull_requests",
        }
    }

    /// Payload field holding the provider-assigned identifier.
    pub fn natural_key_field(&self) -> &'static str {
        match self {
            ResourceKind::Commits => "sha",
            _ => "id",
        }
    }

    /// Resolve the HTTP route segment (`repos`, `pulls`, ...) to a kind.
    pub fn from_route(segment: &str) -> Option<Self> {
        match segment {
            "organizations" | "orgs" => Some(ResourceKind::Organizations),
            "repos" | "repositories" => Some(ResourceKind::Repositories),
            "commits" => Some(ResourceKind::Commits),
            "issues" => Some(ResourceKind::Issues),
            "pulls" | "pull_requests" => Some(ResourceKind::PullRequests),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_route(s).ok_or_else(|| format!("unknown resource kind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_segments_resolve_to_kinds() {
        assert_eq!(
            ResourceKind::from_route("repos"),
            Some(ResourceKind::Repositories)
        );
        assert_eq!(
            ResourceKind::from_route("pulls"),
            Some(ResourceKind::PullRequests)
        );
        assert_eq!(ResourceKind::from_route("gists"), None);
        assert!("wikis".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn commits_are_keyed_by_sha() {
        assert_eq!(ResourceKind::Commits.natural_key_field(), "sha");
        assert_eq!(ResourceKind::Issues.natural_key_field(), "id");
    }

    #[test]
    fn serde_names_match_collection_names() {
        for kind in ResourceKind::ALL {
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, serde_json::json!(kind.as_str()));
        }
    }
}
