//! GitHub REST access: OAuth code exchange, the authenticated client, and
//! paginated list traversal.

pub mod client;
pub mod error;
pub mod pagination;

pub use client::{GitHubApi, GitHubClient, GitHubUser, OAuthApp, PAGE_SIZE};
pub use error::GitHubError;
pub use pagination::{PageStream, ResourceLocator, fetch_pages};
