//! Migration to create the connected_accounts table.
//!
//! Stores provider grants (GitHub, X) for the owner account. Several rows
//! per provider may accumulate; readers pick the most recently updated one.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ConnectedAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConnectedAccounts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ConnectedAccounts::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(ConnectedAccounts::Provider)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::ProviderUser)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConnectedAccounts::AccessToken).text().null())
                    .col(
                        ColumnDef::new(ConnectedAccounts::RefreshToken)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ConnectedAccounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_connected_accounts_user_id")
                            .from(ConnectedAccounts::Table, ConnectedAccounts::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_connected_accounts_provider_user")
                    .table(ConnectedAccounts::Table)
                    .col(ConnectedAccounts::Provider)
                    .col(ConnectedAccounts::ProviderUser)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_connected_accounts_provider")
                    .table(ConnectedAccounts::Table)
                    .col(ConnectedAccounts::Provider)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_connected_accounts_provider_user")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_connected_accounts_provider")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ConnectedAccounts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ConnectedAccounts {
    Table,
    Id,
    UserId,
    Provider,
    ProviderUser,
    AccessToken,
    RefreshToken,
    ExpiresAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
