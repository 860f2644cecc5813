//! In-memory repository implementations.
//!
//! Process-local stores used by the pipeline tests and local development.
//! `claim_ready` serializes claimers on a mutex, which preserves the
//! at-most-one-claim guarantee of the production SKIP LOCKED query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::NotificationResult;
use crate::models::{
    DevicePushToken, EmailMessage, Notification, NotificationRecipient, OutboxRecord, OutboxStatus,
    PushPlatform, SmsMessage,
};
use crate::repository::{
    DeviceTokenRepository, EmailMessageRepository, NotificationRepository, OutboxRepository,
    RecipientRepository, SmsMessageRepository,
};

/// In-memory [`OutboxRepository`].
#[derive(Default)]
pub struct MemoryOutboxRepository {
    records: Mutex<HashMap<Uuid, OutboxRecord>>,
}

impl MemoryOutboxRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OutboxRepository for MemoryOutboxRepository {
    async fn insert(&self, record: &OutboxRecord) -> NotificationResult<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<OutboxRecord>> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, record: &OutboxRecord) -> NotificationResult<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn claim_ready(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> NotificationResult<Vec<OutboxRecord>> {
        let mut records = self.records.lock().unwrap();

        let mut ready: Vec<Uuid> = records
            .values()
            .filter(|r| r.is_ready(now))
            .map(|r| r.id)
            .collect();
        // Oldest first, id as tiebreaker for determinism
        ready.sort_by_key(|id| {
            let r = &records[id];
            (r.created_at, r.id)
        });
        ready.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(ready.len());
        for id in ready {
            let record = records.get_mut(&id).expect("record exists");
            record.mark_processing(now);
            claimed.push(record.clone());
        }
        Ok(claimed)
    }

    async fn reset_stuck(&self, stuck_before: DateTime<Utc>) -> NotificationResult<u64> {
        let mut records = self.records.lock().unwrap();
        let mut reset = 0;
        for record in records.values_mut() {
            let stuck = record.processed_at.is_none()
                && record
                    .processing_started_at
                    .is_some_and(|at| at < stuck_before);
            if stuck {
                record.reset_to_pending();
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn delete_processed_before(&self, threshold: DateTime<Utc>) -> NotificationResult<u64> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| {
            !(r.status == OutboxStatus::Processed && r.processed_at.is_some_and(|at| at < threshold))
        });
        Ok((before - records.len()) as u64)
    }
}

/// In-memory [`EmailMessageRepository`].
#[derive(Default)]
pub struct MemoryEmailRepository {
    emails: Mutex<HashMap<Uuid, EmailMessage>>,
}

impl MemoryEmailRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmailMessageRepository for MemoryEmailRepository {
    async fn insert(&self, email: &EmailMessage) -> NotificationResult<()> {
        self.emails.lock().unwrap().insert(email.id, email.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<EmailMessage>> {
        Ok(self.emails.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, email: &EmailMessage) -> NotificationResult<()> {
        self.emails.lock().unwrap().insert(email.id, email.clone());
        Ok(())
    }
}

/// In-memory [`SmsMessageRepository`].
#[derive(Default)]
pub struct MemorySmsRepository {
    messages: Mutex<HashMap<Uuid, SmsMessage>>,
}

impl MemorySmsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SmsMessageRepository for MemorySmsRepository {
    async fn insert(&self, sms: &SmsMessage) -> NotificationResult<()> {
        self.messages.lock().unwrap().insert(sms.id, sms.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<SmsMessage>> {
        Ok(self.messages.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, sms: &SmsMessage) -> NotificationResult<()> {
        self.messages.lock().unwrap().insert(sms.id, sms.clone());
        Ok(())
    }
}

/// In-memory [`NotificationRepository`].
#[derive(Default)]
pub struct MemoryNotificationRepository {
    notifications: Mutex<HashMap<Uuid, Notification>>,
}

impl MemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
    async fn insert(&self, notification: &Notification) -> NotificationResult<()> {
        self.notifications
            .lock()
            .unwrap()
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<Notification>> {
        Ok(self.notifications.lock().unwrap().get(&id).cloned())
    }
}

/// In-memory [`RecipientRepository`].
#[derive(Default)]
pub struct MemoryRecipientRepository {
    recipients: Mutex<HashMap<Uuid, NotificationRecipient>>,
}

impl MemoryRecipientRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipientRepository for MemoryRecipientRepository {
    async fn insert(&self, recipient: &NotificationRecipient) -> NotificationResult<()> {
        self.recipients
            .lock()
            .unwrap()
            .insert(recipient.id, recipient.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<NotificationRecipient>> {
        Ok(self.recipients.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, recipient: &NotificationRecipient) -> NotificationResult<()> {
        self.recipients
            .lock()
            .unwrap()
            .insert(recipient.id, recipient.clone());
        Ok(())
    }
}

/// In-memory [`DeviceTokenRepository`].
#[derive(Default)]
pub struct MemoryDeviceTokenRepository {
    tokens: Mutex<HashMap<Uuid, DevicePushToken>>,
}

impl MemoryDeviceTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceTokenRepository for MemoryDeviceTokenRepository {
    async fn find_by_id(&self, id: Uuid) -> NotificationResult<Option<DevicePushToken>> {
        Ok(self.tokens.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_device(
        &self,
        device_id: &str,
        platform: PushPlatform,
    ) -> NotificationResult<Option<DevicePushToken>> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .values()
            .find(|t| t.device_id == device_id && t.platform == platform)
            .cloned())
    }

    async fn find_active_by_user(
        &self,
        user_id: Uuid,
    ) -> NotificationResult<Vec<DevicePushToken>> {
        let tokens = self.tokens.lock().unwrap();
        let mut active: Vec<DevicePushToken> = tokens
            .values()
            .filter(|t| t.user_id == user_id && t.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(active)
    }

    async fn save(&self, token: &DevicePushToken) -> NotificationResult<()> {
        self.tokens.lock().unwrap().insert(token.id, token.clone());
        Ok(())
    }

    async fn deactivate_siblings(
        &self,
        device_id: &str,
        platform: PushPlatform,
        keep_id: Uuid,
    ) -> NotificationResult<u64> {
        let mut tokens = self.tokens.lock().unwrap();
        let now = Utc::now();
        let mut deactivated = 0;
        for token in tokens.values_mut() {
            if token.device_id == device_id
                && token.platform == platform
                && token.id != keep_id
                && token.active
            {
                token.deactivate(now);
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffPolicy;
    use crate::models::Channel;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_claim_ready_orders_oldest_first_and_respects_limit() {
        let repo = MemoryOutboxRepository::new();
        let mut first = OutboxRecord::new(Channel::Email, Uuid::new_v4(), "EMAIL_REQUESTED", 3);
        first.created_at = Utc::now() - chrono::Duration::minutes(10);
        let second = OutboxRecord::new(Channel::Email, Uuid::new_v4(), "EMAIL_REQUESTED", 3);
        repo.insert(&second).await.unwrap();
        repo.insert(&first).await.unwrap();

        let claimed = repo.claim_ready(Utc::now(), 1).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, first.id);
        assert_eq!(claimed[0].status, OutboxStatus::Processing);

        // The claimed record is no longer ready; the other one is
        let claimed = repo.claim_ready(Utc::now(), 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, second.id);
    }

    #[tokio::test]
    async fn test_concurrent_claimers_never_share_a_record() {
        let repo = Arc::new(MemoryOutboxRepository::new());
        for _ in 0..20 {
            repo.insert(&OutboxRecord::new(
                Channel::Sms,
                Uuid::new_v4(),
                "SMS_REQUESTED",
                3,
            ))
            .await
            .unwrap();
        }

        let a = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.claim_ready(Utc::now(), 20).await.unwrap() })
        };
        let b = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.claim_ready(Utc::now(), 20).await.unwrap() })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a.len() + b.len(), 20);
        for record in &a {
            assert!(!b.iter().any(|other| other.id == record.id));
        }
    }

    #[tokio::test]
    async fn test_failed_record_claimable_only_when_due() {
        let repo = MemoryOutboxRepository::new();
        let now = Utc::now();
        let mut record = OutboxRecord::new(Channel::Push, Uuid::new_v4(), "PUSH_REQUESTED", 3);
        record.record_failure("PUSH_FAILED: all devices failed", &BackoffPolicy::push(), now);
        repo.insert(&record).await.unwrap();

        assert!(repo.claim_ready(now, 10).await.unwrap().is_empty());

        let due = now + chrono::Duration::seconds(2);
        let claimed = repo.claim_ready(due, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_stuck_is_idempotent() {
        let repo = MemoryOutboxRepository::new();
        let now = Utc::now();
        let mut record = OutboxRecord::new(Channel::Email, Uuid::new_v4(), "EMAIL_REQUESTED", 3);
        record.mark_processing(now - chrono::Duration::hours(2));
        repo.insert(&record).await.unwrap();

        let threshold = now - chrono::Duration::hours(1);
        assert_eq!(repo.reset_stuck(threshold).await.unwrap(), 1);
        // Once reset, the record is PENDING and no longer matches
        assert_eq!(repo.reset_stuck(threshold).await.unwrap(), 0);

        let claimed = repo.claim_ready(now, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, record.id);
    }

    #[tokio::test]
    async fn test_cleanup_deletes_only_old_processed() {
        let repo = MemoryOutboxRepository::new();
        let now = Utc::now();

        let mut old = OutboxRecord::new(Channel::Email, Uuid::new_v4(), "EMAIL_REQUESTED", 3);
        old.mark_processed(now - chrono::Duration::days(10));
        let mut recent = OutboxRecord::new(Channel::Email, Uuid::new_v4(), "EMAIL_REQUESTED", 3);
        recent.mark_processed(now - chrono::Duration::days(1));
        let pending = OutboxRecord::new(Channel::Email, Uuid::new_v4(), "EMAIL_REQUESTED", 3);

        repo.insert(&old).await.unwrap();
        repo.insert(&recent).await.unwrap();
        repo.insert(&pending).await.unwrap();

        let threshold = now - chrono::Duration::days(7);
        assert_eq!(repo.delete_processed_before(threshold).await.unwrap(), 1);
        assert_eq!(repo.len(), 2);
        assert!(repo.find_by_id(old.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_device_repo_active_filtering() {
        let repo = MemoryDeviceTokenRepository::new();
        let user = Uuid::new_v4();
        let now = Utc::now();

        let active = DevicePushToken::new(user, "dev-1", PushPlatform::Fcm, "tok-1");
        let mut inactive = DevicePushToken::new(user, "dev-2", PushPlatform::Fcm, "tok-2");
        inactive.deactivate(now);
        let mut revoked = DevicePushToken::new(user, "dev-3", PushPlatform::Apns, "tok-3");
        revoked.revoke(now);
        let other_user = DevicePushToken::new(Uuid::new_v4(), "dev-4", PushPlatform::Fcm, "tok-4");

        for token in [&active, &inactive, &revoked, &other_user] {
            repo.save(token).await.unwrap();
        }

        let found = repo.find_active_by_user(user).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, active.id);
    }
}
