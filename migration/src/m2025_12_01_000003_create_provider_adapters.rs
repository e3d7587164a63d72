//! Creates the provider_adapters table holding per-provider adapter configs.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderAdapters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderAdapters::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProviderAdapters::Identifier).text().not_null())
                    .col(
                        ColumnDef::new(ProviderAdapters::Configs)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderAdapters::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProviderAdapters::UpdatedAt)
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
                    .name("idx_provider_adapters_identifier")
                    .table(ProviderAdapters::Table)
                    .col(ProviderAdapters::Identifier)
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
                    .name("idx_provider_adapters_identifier")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ProviderAdapters::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProviderAdapters {
    Table,
    Id,
    Identifier,
    Configs,
    CreatedAt,
    UpdatedAt,
}
