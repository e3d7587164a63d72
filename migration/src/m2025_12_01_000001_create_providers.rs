//! Creates the providers catalog table.
//!
//! Rows are soft-deleted through `deleted_at`; categories, permissions and
//! tags live in `json_attributes`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Providers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Providers::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Providers::Identifier).text().not_null())
                    .col(ColumnDef::new(Providers::Name).text().not_null())
                    .col(
                        ColumnDef::new(Providers::Description)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Providers::AuthType).text().not_null())
                    .col(
                        ColumnDef::new(Providers::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(Providers::IconUrl).text().null())
                    .col(
                        ColumnDef::new(Providers::JsonAttributes)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Providers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Providers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Providers::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_providers_identifier")
                    .table(Providers::Table)
                    .col(Providers::Identifier)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_providers_identifier").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Providers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Providers {
    Table,
    Id,
    Identifier,
    Name,
    Description,
    AuthType,
    Status,
    IconUrl,
    JsonAttributes,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}
