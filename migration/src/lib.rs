//! Database migrations for the GitHub sync service.

pub use sea_orm_migration::prelude::*;

mod m2025_11_10_000001_create_integrations;
mod m2025_11_10_000002_create_github_records;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_11_10_000001_create_integrations::Migration),
            Box::new(m2025_11_10_000002_create_github_records::Migration),
        ]
    }
}
