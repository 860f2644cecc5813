use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DevicePushToken::Table)
                    .if_not_exists()
                    .col(pk_uuid(DevicePushToken::Id))
                    .col(uuid(DevicePushToken::UserId))
                    .col(string_len(DevicePushToken::DeviceId, 255))
                    .col(string_len(DevicePushToken::Platform, 32))
                    .col(text(DevicePushToken::Token))
                    .col(boolean(DevicePushToken::Active).default(true))
                    .col(timestamp(DevicePushToken::LastUsedAt))
                    .col(timestamp_null(DevicePushToken::RevokedAt))
                    .col(timestamp(DevicePushToken::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp(DevicePushToken::UpdatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        // One registration row per device and platform
        manager
            .create_index(
                Index::create()
                    .name("uk_device_platform")
                    .table(DevicePushToken::Table)
                    .col(DevicePushToken::DeviceId)
                    .col(DevicePushToken::Platform)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Fan-out lookup: active tokens by user
        manager
            .create_index(
                Index::create()
                    .name("idx_device_user_active")
                    .table(DevicePushToken::Table)
                    .col(DevicePushToken::UserId)
                    .col(DevicePushToken::Active)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DevicePushToken::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum DevicePushToken {
    Table,
    Id,
    UserId,
    DeviceId,
    Platform,
    Token,
    Active,
    LastUsedAt,
    RevokedAt,
    CreatedAt,
    UpdatedAt,
}
