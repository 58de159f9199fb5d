//! Migration to create the security_events table.
//!
//! Append-only audit log for webhook validation outcomes, refresh failures,
//! and token revocations. Rows are never updated or deleted by the service.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SecurityEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SecurityEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SecurityEvents::Provider).text().not_null())
                    .col(ColumnDef::new(SecurityEvents::Kind).text().not_null())
                    .col(ColumnDef::new(SecurityEvents::ClientIp).text().null())
                    .col(ColumnDef::new(SecurityEvents::Reason).text().null())
                    .col(ColumnDef::new(SecurityEvents::Detail).json_binary().null())
                    .col(
                        ColumnDef::new(SecurityEvents::CreatedAt)
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
                    .name("idx_security_events_provider_created_at")
                    .table(SecurityEvents::Table)
                    .col(SecurityEvents::Provider)
                    .col(SecurityEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SecurityEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SecurityEvents {
    Table,
    Id,
    Provider,
    Kind,
    ClientIp,
    Reason,
    Detail,
    CreatedAt,
}
