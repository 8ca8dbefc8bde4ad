//! # Repository Layer
//!
//! SeaORM access for integrations and mirrored GitHub records, plus the
//! filter-model translation used by the read side.

pub mod filter;
pub mod github_record;
pub mod integration;

pub use filter::{FilterError, FilterModel};
pub use github_record::{GithubRecordRepository, NaturalKey, RecordFields, RecordPage, RecordQuery};
pub use integration::{IntegrationRepository, IntegrationUpsert};
