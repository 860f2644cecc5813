use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Transactional outbox
        manager
            .create_table(
                Table::create()
                    .table(OutboxMessage::Table)
                    .if_not_exists()
                    .col(pk_uuid(OutboxMessage::Id))
                    .col(string_len(OutboxMessage::Channel, 32))
                    .col(uuid(OutboxMessage::MessageId))
                    .col(string_len(OutboxMessage::EventType, 100))
                    .col(string_len(OutboxMessage::Status, 32))
                    .col(integer(OutboxMessage::AttemptCount).default(0))
                    .col(integer(OutboxMessage::MaxAttempts))
                    .col(timestamp_null(OutboxMessage::NextAttemptAt))
                    .col(text_null(OutboxMessage::LastError))
                    .col(timestamp_null(OutboxMessage::ProcessingStartedAt))
                    .col(timestamp_null(OutboxMessage::ProcessedAt))
                    .col(string_len(OutboxMessage::PartitionKey, 50))
                    .col(timestamp(OutboxMessage::CreatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        // One record per logical delivery intent
        manager
            .create_index(
                Index::create()
                    .name("uk_outbox_intent")
                    .table(OutboxMessage::Table)
                    .col(OutboxMessage::Channel)
                    .col(OutboxMessage::MessageId)
                    .col(OutboxMessage::EventType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Supports the ready-for-claim query
        manager
            .create_index(
                Index::create()
                    .name("idx_outbox_ready")
                    .table(OutboxMessage::Table)
                    .col(OutboxMessage::Status)
                    .col(OutboxMessage::NextAttemptAt)
                    .col(OutboxMessage::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmailMessage::Table)
                    .if_not_exists()
                    .col(pk_uuid(EmailMessage::Id))
                    .col(string_len(EmailMessage::ToEmail, 255))
                    .col(string_null(EmailMessage::CcEmail))
                    .col(string_len(EmailMessage::Subject, 255))
                    .col(text(EmailMessage::Body))
                    .col(string_len(EmailMessage::Status, 32))
                    .col(text_null(EmailMessage::LastError))
                    .col(integer(EmailMessage::Attempts).default(0))
                    .col(timestamp_null(EmailMessage::SentAt))
                    .col(timestamp_null(EmailMessage::LastAttemptAt))
                    .col(timestamp(EmailMessage::CreatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_email_message_status")
                    .table(EmailMessage::Table)
                    .col(EmailMessage::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SmsMessage::Table)
                    .if_not_exists()
                    .col(pk_uuid(SmsMessage::Id))
                    .col(string_len(SmsMessage::PhoneNumber, 32))
                    .col(text(SmsMessage::Body))
                    .col(string_len(SmsMessage::Status, 32))
                    .col(text_null(SmsMessage::LastError))
                    .col(integer(SmsMessage::Attempts).default(0))
                    .col(timestamp_null(SmsMessage::SentAt))
                    .col(timestamp_null(SmsMessage::LastAttemptAt))
                    .col(timestamp(SmsMessage::CreatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sms_message_status")
                    .table(SmsMessage::Table)
                    .col(SmsMessage::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Notification::Table)
                    .if_not_exists()
                    .col(pk_uuid(Notification::Id))
                    .col(string_len(Notification::Subject, 255))
                    .col(text(Notification::Body))
                    .col(json_binary(Notification::Metadata))
                    .col(timestamp(Notification::CreatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(NotificationRecipient::Table)
                    .if_not_exists()
                    .col(pk_uuid(NotificationRecipient::Id))
                    .col(uuid(NotificationRecipient::NotificationId))
                    .col(uuid(NotificationRecipient::UserId))
                    .col(string_len(NotificationRecipient::Status, 32))
                    .col(text_null(NotificationRecipient::LastError))
                    .col(integer(NotificationRecipient::Attempts).default(0))
                    .col(timestamp_null(NotificationRecipient::SentAt))
                    .col(timestamp_null(NotificationRecipient::LastAttemptAt))
                    .col(
                        timestamp(NotificationRecipient::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notification_recipient_notification")
                            .from(
                                NotificationRecipient::Table,
                                NotificationRecipient::NotificationId,
                            )
                            .to(Notification::Table, Notification::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notification_recipient_user")
                    .table(NotificationRecipient::Table)
                    .col(NotificationRecipient::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NotificationRecipient::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notification::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SmsMessage::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailMessage::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OutboxMessage::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum OutboxMessage {
    Table,
    Id,
    Channel,
    MessageId,
    EventType,
    Status,
    AttemptCount,
    MaxAttempts,
    NextAttemptAt,
    LastError,
    ProcessingStartedAt,
    ProcessedAt,
    PartitionKey,
    CreatedAt,
}

#[derive(DeriveIden)]
enum EmailMessage {
    Table,
    Id,
    ToEmail,
    CcEmail,
    Subject,
    Body,
    Status,
    LastError,
    Attempts,
    SentAt,
    LastAttemptAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SmsMessage {
    Table,
    Id,
    PhoneNumber,
    Body,
    Status,
    LastError,
    Attempts,
    SentAt,
    LastAttemptAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Notification {
    Table,
    Id,
    Subject,
    Body,
    Metadata,
    CreatedAt,
}

#[derive(DeriveIden)]
enum NotificationRecipient {
    Table,
    Id,
    NotificationId,
    UserId,
    Status,
    LastError,
    Attempts,
    SentAt,
    LastAttemptAt,
    CreatedAt,
}
