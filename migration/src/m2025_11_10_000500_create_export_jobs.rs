//! Migration to create the export_jobs table.
//!
//! Export jobs are retried with bounded exponential backoff; once the retry
//! budget is exhausted they move to the terminal permanently_failed state and
//! keep their full retry history for diagnosis.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExportJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExportJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ExportJobs::UserRef).uuid().not_null())
                    .col(ColumnDef::new(ExportJobs::ExportType).text().not_null())
                    .col(ColumnDef::new(ExportJobs::Config).json_binary().null())
                    .col(
                        ColumnDef::new(ExportJobs::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ExportJobs::ProgressPct)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ExportJobs::FileUrl).text().null())
                    .col(ColumnDef::new(ExportJobs::FileSize).big_integer().null())
                    .col(ColumnDef::new(ExportJobs::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(ExportJobs::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ExportJobs::MaxRetries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(ExportJobs::RetryHistory)
                            .json_binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ExportJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ExportJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ExportJobs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ExportJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for the retry manager scan over failed jobs
        manager
            .create_index(
                Index::create()
                    .name("idx_export_jobs_status_updated")
                    .table(ExportJobs::Table)
                    .col(ExportJobs::Status)
                    .col(ExportJobs::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_export_jobs_status_updated")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ExportJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ExportJobs {
    Table,
    Id,
    UserRef,
    ExportType,
    Config,
    Status,
    ProgressPct,
    FileUrl,
    FileSize,
    ErrorMessage,
    RetryCount,
    MaxRetries,
    RetryHistory,
    CreatedAt,
    StartedAt,
    CompletedAt,
    UpdatedAt,
}
