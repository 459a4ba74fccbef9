//! Migration to create the webinars table.
//!
//! Webinar rows are upserted keyed on (connection_id, provider_webinar_id) so
//! repeated syncs never duplicate a webinar.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Webinars::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Webinars::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Webinars::ConnectionId).uuid().not_null())
                    .col(
                        ColumnDef::new(Webinars::ProviderWebinarId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Webinars::Topic).text().not_null())
                    .col(
                        ColumnDef::new(Webinars::StartTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Webinars::DurationMinutes).integer().null())
                    .col(
                        ColumnDef::new(Webinars::IsRecurring)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Webinars::TotalAttendees)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Webinars::Raw).json_binary().null())
                    .col(
                        ColumnDef::new(Webinars::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Webinars::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_webinars_connection_id")
                            .from(Webinars::Table, Webinars::ConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webinars_connection_provider_webinar")
                    .table(Webinars::Table)
                    .col(Webinars::ConnectionId)
                    .col(Webinars::ProviderWebinarId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_webinars_connection_provider_webinar")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Webinars::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Webinars {
    Table,
    Id,
    ConnectionId,
    ProviderWebinarId,
    Topic,
    StartTime,
    DurationMinutes,
    IsRecurring,
    TotalAttendees,
    Raw,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
}
