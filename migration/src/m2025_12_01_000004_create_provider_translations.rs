//! Creates the provider_translations table.
//!
//! One row per (provider identifier, language code); `translations` holds the
//! compact i18n JSON payload.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderTranslations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderTranslations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProviderTranslations::ProviderIdentifier)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderTranslations::LanguageCode)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderTranslations::Translations)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderTranslations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProviderTranslations::UpdatedAt)
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
                    .name("idx_provider_translations_identifier_language")
                    .table(ProviderTranslations::Table)
                    .col(ProviderTranslations::ProviderIdentifier)
                    .col(ProviderTranslations::LanguageCode)
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
                    .name("idx_provider_translations_identifier_language")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ProviderTranslations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProviderTranslations {
    Table,
    Id,
    ProviderIdentifier,
    LanguageCode,
    Translations,
    CreatedAt,
    UpdatedAt,
}
