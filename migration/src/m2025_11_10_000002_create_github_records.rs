//! Migration to create the github_records table.
//!
//! Mirrored organizations, repositories, commits, issues and pull requests
//! share this table, partitioned by `collection`. The natural key is
//! `(collection, user_id, natural_id)`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GithubRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GithubRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GithubRecords::Collection)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(GithubRecords::UserId).big_integer().not_null())
                    .col(ColumnDef::new(GithubRecords::NaturalId).text().not_null())
                    .col(ColumnDef::new(GithubRecords::OrgId).big_integer().null())
                    .col(ColumnDef::new(GithubRecords::RepoId).big_integer().null())
                    .col(ColumnDef::new(GithubRecords::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(GithubRecords::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(GithubRecords::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_github_records_natural_key")
                    .table(GithubRecords::Table)
                    .col(GithubRecords::Collection)
                    .col(GithubRecords::UserId)
                    .col(GithubRecords::NaturalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Read-side listing orders by recency within a collection.
        manager
            .create_index(
                Index::create()
                    .name("idx_github_records_collection_updated_at")
                    .table(GithubRecords::Table)
                    .col(GithubRecords::Collection)
                    .col(GithubRecords::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_github_records_repo_id")
                    .table(GithubRecords::Table)
                    .col(GithubRecords::RepoId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_github_records_natural_key",
            "idx_github_records_collection_updated_at",
            "idx_github_records_repo_id",
        ] {
            manager
                .drop_index(Index::drop().name(name).to_owned())
                .await?;
        }

        manager
            .drop_table(Table::drop().table(GithubRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GithubRecords {
    Table,
    Id,
    Collection,
    UserId,
    NaturalId,
    OrgId,
    RepoId,
    Payload,
    CreatedAt,
    UpdatedAt,
}
