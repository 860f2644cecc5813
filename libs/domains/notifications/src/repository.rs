//! Repository traits for the notifications domain.
//!
//! The delivery pipeline (poller, dispatchers, device service) works
//! against these traits; `postgres` provides the production SeaORM
//! implementations and `memory` provides process-local ones for tests and
//! local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::NotificationResult;
use crate::models::{
    DevicePushToken, EmailMessage, Notification, NotificationRecipient, OutboxRecord, PushPlatform,
    SmsMessage,
};

/// Persistence for outbox records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Insert a new record.
    async fn insert(&self, record: &OutboxRecord) -> NotificationResult<()>;

    /// Get a record by id.
    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<OutboxRecord>>;

    /// Persist the current state of a record.
    async fn update(&self, record: &OutboxRecord) -> NotificationResult<()>;

    /// Atomically claim up to `limit` ready records, oldest first.
    ///
    /// "Ready" means PENDING, or FAILED with attempts left and
    /// `next_attempt_at <= now`. Claimed records are transitioned to
    /// PROCESSING with `processing_started_at` stamped before they are
    /// returned. Implementations MUST guarantee that concurrent callers
    /// never claim the same record (SELECT ... FOR UPDATE SKIP LOCKED or
    /// equivalent), and must not block one claimer behind another.
    async fn claim_ready(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> NotificationResult<Vec<OutboxRecord>>;

    /// Reset records stuck in PROCESSING since before `stuck_before` (no
    /// `processed_at`) back to PENDING. Returns the number reset.
    async fn reset_stuck(&self, stuck_before: DateTime<Utc>) -> NotificationResult<u64>;

    /// Delete PROCESSED records older than `threshold`. Returns the number
    /// deleted.
    async fn delete_processed_before(&self, threshold: DateTime<Utc>) -> NotificationResult<u64>;
}

/// Persistence for email payloads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailMessageRepository: Send + Sync {
    async fn insert(&self, email: &EmailMessage) -> NotificationResult<()>;
    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<EmailMessage>>;
    async fn update(&self, email: &EmailMessage) -> NotificationResult<()>;
}

/// Persistence for SMS payloads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsMessageRepository: Send + Sync {
    async fn insert(&self, sms: &SmsMessage) -> NotificationResult<()>;
    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<SmsMessage>>;
    async fn update(&self, sms: &SmsMessage) -> NotificationResult<()>;
}

/// Persistence for notification content rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &Notification) -> NotificationResult<()>;
    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<Notification>>;
}

/// Persistence for per-recipient delivery state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecipientRepository: Send + Sync {
    async fn insert(&self, recipient: &NotificationRecipient) -> NotificationResult<()>;
    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<NotificationRecipient>>;
    async fn update(&self, recipient: &NotificationRecipient) -> NotificationResult<()>;
}

/// Persistence for device push tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceTokenRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<DevicePushToken>>;

    /// The device's current registration, active or not.
    async fn find_by_device(
        &self,
        device_id: &str,
        platform: PushPlatform,
    ) -> NotificationResult<Option<DevicePushToken>>;

    /// All active, non-revoked tokens of a user, across devices.
    async fn find_active_by_user(&self, user_id: Uuid)
        -> NotificationResult<Vec<DevicePushToken>>;

    /// Insert or update the token row.
    async fn save(&self, token: &DevicePushToken) -> NotificationResult<()>;

    /// Deactivate the device's other tokens, keeping only `keep_id` active.
    /// Returns the number deactivated.
    async fn deactivate_siblings(
        &self,
        device_id: &str,
        platform: PushPlatform,
        keep_id: Uuid,
    ) -> NotificationResult<u64>;
}
