//! # Data Models
//!
//! SeaORM entities for the GitHub sync service plus small shared API types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod github_record;
pub mod integration;
pub mod resource_kind;

pub use github_record::Entity as GithubRecord;
pub use integration::Entity as Integration;
pub use resource_kind::ResourceKind;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "github-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
