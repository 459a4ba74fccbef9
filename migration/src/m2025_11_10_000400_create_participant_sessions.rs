//! Migration to create the participant_sessions table.
//!
//! One row per join/leave interval. A participant may contribute several rows
//! per webinar; uniqueness is the derived (webinar_id, session_key) pair, not
//! participant identity. The full set for a webinar is replaced on each
//! resync.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ParticipantSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ParticipantSessions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ParticipantSessions::WebinarId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantSessions::SessionKey)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantSessions::ParticipantId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantSessions::DisplayName)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(ParticipantSessions::Email).text().null())
                    .col(
                        ColumnDef::new(ParticipantSessions::JoinTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantSessions::LeaveTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantSessions::DurationSeconds)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ParticipantSessions::RaisedHand)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ParticipantSessions::PostedChat)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ParticipantSessions::AskedQuestion)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ParticipantSessions::AnsweredPolling)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ParticipantSessions::Device).text().null())
                    .col(ColumnDef::new(ParticipantSessions::Location).text().null())
                    .col(
                        ColumnDef::new(ParticipantSessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_participant_sessions_webinar_id")
                            .from(
                                ParticipantSessions::Table,
                                ParticipantSessions::WebinarId,
                            )
                            .to(Webinars::Table, Webinars::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_participant_sessions_webinar_session_key")
                    .table(ParticipantSessions::Table)
                    .col(ParticipantSessions::WebinarId)
                    .col(ParticipantSessions::SessionKey)
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
                    .name("idx_participant_sessions_webinar_session_key")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .table(ParticipantSessions::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum ParticipantSessions {
    Table,
    Id,
    WebinarId,
    SessionKey,
    ParticipantId,
    DisplayName,
    Email,
    JoinTime,
    LeaveTime,
    DurationSeconds,
    RaisedHand,
    PostedChat,
    AskedQuestion,
    AnsweredPolling,
    Device,
    Location,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Webinars {
    Table,
    Id,
}
