//! Migration to create the integrations table.
//!
//! An integration is one user's OAuth connection to one external provider.
//! Token material is stored only as AES-256-GCM ciphertext; expiry and scopes
//! are kept in plaintext columns for refresh scheduling.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Integrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Integrations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Integrations::UserId).uuid().not_null())
                    .col(ColumnDef::new(Integrations::Provider).text().not_null())
                    .col(
                        ColumnDef::new(Integrations::Status)
                            .text()
                            .not_null()
                            .default("connected"),
                    )
                    .col(ColumnDef::new(Integrations::DisplayName).text().null())
                    .col(
                        ColumnDef::new(Integrations::AccessTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::RefreshTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Integrations::Scopes).json_binary().null())
                    .col(
                        ColumnDef::new(Integrations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Integrations::UpdatedAt)
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
                    .name("idx_integrations_user_id")
                    .table(Integrations::Table)
                    .col(Integrations::UserId)
                    .to_owned(),
            )
            .await?;

        // One connection per (user, provider) pair.
        manager
            .create_index(
                Index::create()
                    .name("uq_integrations_user_provider")
                    .table(Integrations::Table)
                    .col(Integrations::UserId)
                    .col(Integrations::Provider)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // The refresh sweep scans connected integrations ordered by expiry.
        manager
            .create_index(
                Index::create()
                    .name("idx_integrations_status_expires_at")
                    .table(Integrations::Table)
                    .col(Integrations::Status)
                    .col(Integrations::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Integrations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Integrations {
    Table,
    Id,
    UserId,
    Provider,
    Status,
    DisplayName,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    ExpiresAt,
    Scopes,
    CreatedAt,
    UpdatedAt,
}
