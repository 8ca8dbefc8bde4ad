//! # GitHub Sync Library
//!
//! OAuth-driven mirroring of a user's GitHub organizations, repositories,
//! commits, issues and pull requests, with a paginated read API over the
//! stored records.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod github;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod server;
pub mod sync;
pub mod telemetry;
pub use migration;
