//! Parent context threaded down the organization → repository → resource hierarchy.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::github::ResourceLocator;
use crate::models::{ResourceKind, github_record};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum ParentContext {
    User {
        user_id: i64,
        login: String,
    },
    Organization {
        org_id: i64,
        login: String,
    },
    Repository {
        org_id: i64,
        repo_id: i64,
        owner: String,
        name: String,
    },
}

impl ParentContext {
    /// Context for a stored organization record; `None` when `login` is missing.
    pub fn organization(record: &github_record::Model) -> Option<Self> {
        Some(ParentContext::Organization {
            org_id: record.numeric_id()?,
            login: record.payload_str("login")?.to_string(),
        })
    }

    /// Context for a stored repository record under `org`.
    pub fn repository(org: &ParentContext, record: &github_record::Model) -> Option<Self> {
        let ParentContext::Organization { org_id, .. } = org else {
            return None;
        };
        let owner = record
            .payload
            .get("owner")
            .and_then(|owner| owner.get("login"))
            .and_then(Value::as_str)?;
        Some(ParentContext::Repository {
            org_id: *org_id,
            repo_id: record.numeric_id()?,
            owner: owner.to_string(),
            name: record.payload_str("name")?.to_string(),
        })
    }

    pub fn org_id(&self) -> Option<i64> {
        match self {
            ParentContext::User { .. } => None,
            ParentContext::Organization { org_id, .. }
            | ParentContext::Repository { org_id, .. } => Some(*org_id),
        }
    }

    pub fn repo_id(&self) -> Option<i64> {
        match self {
            ParentContext::Repository { repo_id, .. } => Some(*repo_id),
            _ => None,
        }
    }

    /// List endpoint for `kind` under this parent, when the pairing is valid.
    pub fn locator(&self, kind: ResourceKind) -> Option<ResourceLocator> {
        match (self, kind) {
            (ParentContext::User { .. }, ResourceKind::Organizations) => {
                Some(ResourceLocator::UserOrganizations)
            }
            (ParentContext::Organization { login, .. }, ResourceKind::Repositories) => {
                Some(ResourceLocator::OrganizationRepositories { org: login.clone() })
            }
            (ParentContext::Repository { owner, name, .. }, kind) => {
                ResourceLocator::for_repository(kind, owner, name)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ParentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentContext::User { login, .. } => write!(f, "user {}", login),
            ParentContext::Organization { login, .. } => write!(f, "org {}", login),
            ParentContext::Repository { owner, name, .. } => write!(f, "repo {}/{}", owner, name),
        }
    }
}
