//! SeaORM (PostgreSQL) repository implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, LockBehavior, LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, ExprTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::{
    device_push_token, email_message, notification, notification_recipient, outbox_message,
    sms_message,
};
use crate::error::NotificationResult;
use crate::models::{
    DevicePushToken, EmailMessage, Notification, NotificationRecipient, OutboxRecord, OutboxStatus,
    PushPlatform, SmsMessage,
};
use crate::repository::{
    DeviceTokenRepository, EmailMessageRepository, NotificationRepository, OutboxRepository,
    RecipientRepository, SmsMessageRepository,
};

/// PostgreSQL [`OutboxRepository`].
pub struct PgOutboxRepository {
    db: DatabaseConnection,
}

impl PgOutboxRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    async fn insert(&self, record: &OutboxRecord) -> NotificationResult<()> {
        outbox_message::ActiveModel::from(record)
            .insert(&self.db)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<OutboxRecord>> {
        let model = outbox_message::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn update(&self, record: &OutboxRecord) -> NotificationResult<()> {
        outbox_message::ActiveModel::from(record)
            .update(&self.db)
            .await?;
        Ok(())
    }

    async fn claim_ready(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> NotificationResult<Vec<OutboxRecord>> {
        let txn = self.db.begin().await?;

        // FOR UPDATE SKIP LOCKED: concurrent pollers never claim the same
        // row and never block behind each other.
        let rows = outbox_message::Entity::find()
            .filter(
                Condition::any()
                    .add(outbox_message::Column::Status.eq(OutboxStatus::Pending))
                    .add(
                        Condition::all()
                            .add(outbox_message::Column::Status.eq(OutboxStatus::Failed))
                            .add(
                                Expr::col(outbox_message::Column::AttemptCount)
                                    .lt(Expr::col(outbox_message::Column::MaxAttempts)),
                            )
                            .add(outbox_message::Column::NextAttemptAt.lte(now)),
                    ),
            )
            .order_by_asc(outbox_message::Column::CreatedAt)
            .limit(limit)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .all(&txn)
            .await?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = OutboxRecord::from(row);
            record.mark_processing(now);
            outbox_message::ActiveModel::from(&record).update(&txn).await?;
            claimed.push(record);
        }

        txn.commit().await?;
        Ok(claimed)
    }

    async fn reset_stuck(&self, stuck_before: DateTime<Utc>) -> NotificationResult<u64> {
        let result = outbox_message::Entity::update_many()
            .col_expr(
                outbox_message::Column::Status,
                Expr::value(OutboxStatus::Pending),
            )
            .col_expr(
                outbox_message::Column::ProcessingStartedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .filter(outbox_message::Column::ProcessingStartedAt.is_not_null())
            .filter(outbox_message::Column::ProcessedAt.is_null())
            .filter(outbox_message::Column::ProcessingStartedAt.lt(stuck_before))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn delete_processed_before(&self, threshold: DateTime<Utc>) -> NotificationResult<u64> {
        let result = outbox_message::Entity::delete_many()
            .filter(outbox_message::Column::Status.eq(OutboxStatus::Processed))
            .filter(outbox_message::Column::ProcessedAt.lt(threshold))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

/// PostgreSQL [`EmailMessageRepository`].
pub struct PgEmailRepository {
    db: DatabaseConnection,
}

impl PgEmailRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EmailMessageRepository for PgEmailRepository {
    async fn insert(&self, email: &EmailMessage) -> NotificationResult<()> {
        email_message::ActiveModel::from(email)
            .insert(&self.db)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<EmailMessage>> {
        let model = email_message::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn update(&self, email: &EmailMessage) -> NotificationResult<()> {
        email_message::ActiveModel::from(email)
            .update(&self.db)
            .await?;
        Ok(())
    }
}

/// PostgreSQL [`SmsMessageRepository`].
pub struct PgSmsRepository {
    db: DatabaseConnection,
}

impl PgSmsRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SmsMessageRepository for PgSmsRepository {
    async fn insert(&self, sms: &SmsMessage) -> NotificationResult<()> {
        sms_message::ActiveModel::from(sms).insert(&self.db).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<SmsMessage>> {
        let model = sms_message::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn update(&self, sms: &SmsMessage) -> NotificationResult<()> {
        sms_message::ActiveModel::from(sms).update(&self.db).await?;
        Ok(())
    }
}

/// PostgreSQL [`NotificationRepository`].
pub struct PgNotificationRepository {
    db: DatabaseConnection,
}

impl PgNotificationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn insert(&self, item: &Notification) -> NotificationResult<()> {
        notification::ActiveModel::from(item).insert(&self.db).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<Notification>> {
        let model = notification::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }
}

/// PostgreSQL [`RecipientRepository`].
pub struct PgRecipientRepository {
    db: DatabaseConnection,
}

impl PgRecipientRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecipientRepository for PgRecipientRepository {
    async fn insert(&self, recipient: &NotificationRecipient) -> NotificationResult<()> {
        notification_recipient::ActiveModel::from(recipient)
            .insert(&self.db)
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<NotificationRecipient>> {
        let model = notification_recipient::Entity::find_by_id(id)
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    async fn update(&self, recipient: &NotificationRecipient) -> NotificationResult<()> {
        notification_recipient::ActiveModel::from(recipient)
            .update(&self.db)
            .await?;
        Ok(())
    }
}

/// PostgreSQL [`DeviceTokenRepository`].
pub struct PgDeviceTokenRepository {
    db: DatabaseConnection,
}

impl PgDeviceTokenRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeviceTokenRepository for PgDeviceTokenRepository {
    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<DevicePushToken>> {
        let model = device_push_token::Entity::find_by_id(id)
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    async fn find_by_device(
        &self,
        device_id: &str,
        platform: PushPlatform,
    ) -> NotificationResult<Option<DevicePushToken>> {
        let model = device_push_token::Entity::find()
            .filter(device_push_token::Column::DeviceId.eq(device_id))
            .filter(device_push_token::Column::Platform.eq(platform))
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    async fn find_active_by_user(
        &self,
        user_id: Uuid,
    ) -> NotificationResult<Vec<DevicePushToken>> {
        let models = device_push_token::Entity::find()
            .filter(device_push_token::Column::UserId.eq(user_id))
            .filter(device_push_token::Column::Active.eq(true))
            .filter(device_push_token::Column::RevokedAt.is_null())
            .order_by_asc(device_push_token::Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn save(&self, token: &DevicePushToken) -> NotificationResult<()> {
        device_push_token::Entity::insert(device_push_token::ActiveModel::from(token))
            .on_conflict(
                OnConflict::column(device_push_token::Column::Id)
                    .update_columns([
                        device_push_token::Column::UserId,
                        device_push_token::Column::Token,
                        device_push_token::Column::Active,
                        device_push_token::Column::LastUsedAt,
                        device_push_token::Column::RevokedAt,
                        device_push_token::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn deactivate_siblings(
        &self,
        device_id: &str,
        platform: PushPlatform,
        keep_id: Uuid,
    ) -> NotificationResult<u64> {
        let result = device_push_token::Entity::update_many()
            .col_expr(device_push_token::Column::Active, Expr::value(false))
            .col_expr(
                device_push_token::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(device_push_token::Column::DeviceId.eq(device_id))
            .filter(device_push_token::Column::Platform.eq(platform))
            .filter(device_push_token::Column::Id.ne(keep_id))
            .filter(device_push_token::Column::Active.eq(true))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
