//! Migration to create the sync_attempts table.
//!
//! A sync attempt is one run of the synchronization process for a connection.
//! The row is the durable source of truth for progress across restarts: the
//! orchestrator and recovery service write it, the monitor only reads it.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncAttempts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncAttempts::ConnectionId).uuid().not_null())
                    .col(ColumnDef::new(SyncAttempts::SyncType).text().not_null())
                    .col(
                        ColumnDef::new(SyncAttempts::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(SyncAttempts::Stage)
                            .text()
                            .not_null()
                            .default("initializing"),
                    )
                    .col(
                        ColumnDef::new(SyncAttempts::ExecutionPath)
                            .text()
                            .not_null()
                            .default("direct"),
                    )
                    .col(
                        ColumnDef::new(SyncAttempts::ProcessedItems)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncAttempts::TotalItems)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncAttempts::StageProgressPct)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SyncAttempts::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(SyncAttempts::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncAttempts::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncAttempts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sync_attempts_connection_id")
                            .from(SyncAttempts::Table, SyncAttempts::ConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for the recovery sweep: active attempts by connection and age
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_attempts_connection_status_started")
                    .table(SyncAttempts::Table)
                    .col(SyncAttempts::ConnectionId)
                    .col(SyncAttempts::Status)
                    .col(SyncAttempts::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_attempts_connection_status_started")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SyncAttempts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncAttempts {
    Table,
    Id,
    ConnectionId,
    SyncType,
    Status,
    Stage,
    ExecutionPath,
    ProcessedItems,
    TotalItems,
    StageProgressPct,
    ErrorMessage,
    StartedAt,
    CompletedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
}
