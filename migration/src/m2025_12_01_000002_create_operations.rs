//! Creates the operations table.
//!
//! An operation identifier is unique within its provider.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Operations::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Operations::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Operations::Identifier).text().not_null())
                    .col(ColumnDef::new(Operations::ProviderId).uuid().not_null())
                    .col(ColumnDef::new(Operations::Name).text().not_null())
                    .col(
                        ColumnDef::new(Operations::Description)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Operations::Category)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Operations::JsonAttributes)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Operations::Position)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Operations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Operations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_operations_provider_id")
                            .from(Operations::Table, Operations::ProviderId)
                            .to(Providers::Table, Providers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_operations_provider_identifier")
                    .table(Operations::Table)
                    .col(Operations::ProviderId)
                    .col(Operations::Identifier)
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
                    .name("idx_operations_provider_identifier")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Operations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Operations {
    Table,
    Id,
    Identifier,
    ProviderId,
    Name,
    Description,
    Category,
    JsonAttributes,
    Position,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Providers {
    Table,
    Id,
}
