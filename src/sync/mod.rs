//! # Sync Engine
//!
//! Paginated, capped, idempotent traversal of a user's GitHub organizations,
//! repositories, commits, issues and pull requests into the local store.

pub mod context;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod resources;
pub mod runner;

pub use context::ParentContext;
pub use error::SyncError;
pub use events::{BroadcastPublisher, EventPublisher, FanoutPublisher, SyncEvent, SyncEventKind, TracingPublisher};
pub use orchestrator::{
    GitHubClientFactory, IntegrationSummary, ResourceFailure, SyncCounts, SyncOrchestrator,
    SyncOutcome, SyncReport, SyncSession,
};
pub use resources::{SyncCaps, sync_resource};
pub use runner::{JobHandle, JobResult, JobRunner};
