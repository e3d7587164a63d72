//! Creates the credentials table.
//!
//! Secret material is stored only as AES-GCM ciphertext.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Credentials::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Credentials::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Credentials::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(Credentials::ProviderIdentifier)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Credentials::Kind).text().not_null())
                    .col(
                        ColumnDef::new(Credentials::SecretCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Credentials::Scopes).json_binary().null())
                    .col(
                        ColumnDef::new(Credentials::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Credentials::LastUsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Credentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Credentials::UpdatedAt)
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
                    .name("idx_credentials_user_provider")
                    .table(Credentials::Table)
                    .col(Credentials::UserId)
                    .col(Credentials::ProviderIdentifier)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_credentials_user_provider").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Credentials::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Credentials {
    Table,
    Id,
    UserId,
    ProviderIdentifier,
    Kind,
    SecretCiphertext,
    Scopes,
    ExpiresAt,
    LastUsedAt,
    CreatedAt,
    UpdatedAt,
}
