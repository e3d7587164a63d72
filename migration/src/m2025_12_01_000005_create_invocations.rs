//! Creates the invocations table recording every call a user makes.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Invocations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Invocations::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Invocations::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(Invocations::ProviderIdentifier)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Invocations::OperationIdentifier)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Invocations::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Invocations::Parameters).json_binary().not_null())
                    .col(ColumnDef::new(Invocations::ResponseData).binary().null())
                    .col(ColumnDef::new(Invocations::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(Invocations::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Invocations::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Invocations::DurationMs).big_integer().null())
                    .col(
                        ColumnDef::new(Invocations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Invocations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Listing is always per user, newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_invocations_user_created")
                    .table(Invocations::Table)
                    .col(Invocations::UserId)
                    .col(Invocations::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_invocations_user_created").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Invocations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Invocations {
    Table,
    Id,
    UserId,
    ProviderIdentifier,
    OperationIdentifier,
    Status,
    Parameters,
    ResponseData,
    ErrorMessage,
    StartedAt,
    CompletedAt,
    DurationMs,
    CreatedAt,
    UpdatedAt,
}
