//! Domain models for the notifications domain.
//!
//! The outbox record carries the authoritative retry state (attempt counts,
//! backoff schedule, terminality); channel payloads only record the outcome
//! of their last delivery attempt.

use crate::backoff::BackoffPolicy;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::StringLen;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

/// Delivery channel of a notification.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    #[sea_orm(string_value = "EMAIL")]
    Email,
    #[sea_orm(string_value = "SMS")]
    Sms,
    #[sea_orm(string_value = "PUSH")]
    Push,
    #[sea_orm(string_value = "IN_APP")]
    InApp,
}

/// Status of an outbox record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    /// Waiting to be claimed by a poller.
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Claimed and handed (or being handed) to the transport.
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    /// Delivery settled successfully. Terminal.
    #[sea_orm(string_value = "PROCESSED")]
    Processed,
    /// Last attempt failed; retryable until attempts are exhausted, after
    /// which `next_attempt_at` is cleared and the record is terminal.
    #[sea_orm(string_value = "FAILED")]
    Failed,
    /// Referenced payload missing. Terminal, never retried.
    #[sea_orm(string_value = "INVALID")]
    Invalid,
}

/// Per-attempt status of a channel payload.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageStatus {
    #[sea_orm(string_value = "queued")]
    Queued,
    #[sea_orm(string_value = "sending")]
    Sending,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Push notification platform.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PushPlatform {
    #[sea_orm(string_value = "FCM")]
    Fcm,
    #[sea_orm(string_value = "APNS")]
    Apns,
}

// ============================================================================
// Outbox record
// ============================================================================

/// A durable intent to deliver one notification over one channel.
///
/// Exactly one record exists per (channel, message_id, event_type) logical
/// intent; re-publishing the same intent is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub channel: Channel,
    /// Id of the channel payload (email/sms/recipient row).
    pub message_id: Uuid,
    pub event_type: String,
    pub status: OutboxStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Coarse sharding key derived from the creation date.
    pub partition_key: String,
    pub created_at: DateTime<Utc>,
}

impl OutboxRecord {
    pub fn new(
        channel: Channel,
        message_id: Uuid,
        event_type: impl Into<String>,
        max_attempts: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            channel,
            message_id,
            event_type: event_type.into(),
            status: OutboxStatus::Pending,
            attempt_count: 0,
            max_attempts,
            next_attempt_at: None,
            last_error: None,
            processing_started_at: None,
            processed_at: None,
            partition_key: now.format("%Y%m%d").to_string(),
            created_at: now,
        }
    }

    /// Claimed by a poller: stamp the processing start so crashed pollers
    /// can be recovered by the stuck-reset job.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = OutboxStatus::Processing;
        self.processing_started_at = Some(now);
    }

    /// Delivery settled successfully. Terminal.
    pub fn mark_processed(&mut self, now: DateTime<Utc>) {
        self.status = OutboxStatus::Processed;
        self.processed_at = Some(now);
    }

    /// Referenced payload is missing. Terminal, never retried.
    pub fn mark_invalid(&mut self, error: impl Into<String>) {
        self.status = OutboxStatus::Invalid;
        self.last_error = Some(error.into());
    }

    /// Record a retryable failure: increment the attempt count and either
    /// schedule the next attempt via backoff or, once attempts are
    /// exhausted, clear `next_attempt_at` to signal terminality.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        backoff: &BackoffPolicy,
        now: DateTime<Utc>,
    ) {
        self.attempt_count += 1;
        self.last_error = Some(error.into());
        self.status = OutboxStatus::Failed;

        if self.attempt_count >= self.max_attempts {
            self.next_attempt_at = None;
        } else {
            let delay = backoff.delay_for_attempt(self.attempt_count);
            self.next_attempt_at =
                Some(now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero()));
        }
    }

    /// Record a permanent failure: retrying is futile regardless of the
    /// remaining attempt budget, so no next attempt is scheduled.
    pub fn record_permanent_failure(&mut self, error: impl Into<String>, _now: DateTime<Utc>) {
        self.attempt_count += 1;
        self.last_error = Some(error.into());
        self.status = OutboxStatus::Failed;
        self.next_attempt_at = None;
    }

    /// Reset a record stuck in PROCESSING (e.g. the poller crashed between
    /// claiming and publishing) back to PENDING.
    pub fn reset_to_pending(&mut self) {
        self.status = OutboxStatus::Pending;
        self.processing_started_at = None;
    }

    /// Whether this record is claimable right now.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            OutboxStatus::Pending => true,
            OutboxStatus::Failed => {
                self.attempt_count < self.max_attempts
                    && self.next_attempt_at.is_some_and(|at| at <= now)
            }
            _ => false,
        }
    }

    /// Whether the attempt budget has been used up.
    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

// ============================================================================
// Channel payloads
// ============================================================================

/// An email to deliver, with its per-recipient delivery status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: Uuid,
    pub to_email: String,
    pub cc_email: Option<String>,
    pub subject: String,
    pub body: String,
    pub status: MessageStatus,
    pub last_error: Option<String>,
    pub attempts: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EmailMessage {
    pub fn new(
        to_email: impl Into<String>,
        cc_email: Option<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            to_email: to_email.into(),
            cc_email,
            subject: subject.into(),
            body: body.into(),
            status: MessageStatus::Queued,
            last_error: None,
            attempts: 0,
            sent_at: None,
            last_attempt_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_sending(&mut self, now: DateTime<Utc>) {
        self.status = MessageStatus::Sending;
        self.last_attempt_at = Some(now);
    }

    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.status = MessageStatus::Sent;
        self.sent_at = Some(now);
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.status = MessageStatus::Failed;
        self.last_error = Some(error.into());
        self.attempts += 1;
    }
}

/// An SMS to deliver, with its per-recipient delivery status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsMessage {
    pub id: Uuid,
    pub phone_number: String,
    pub body: String,
    pub status: MessageStatus,
    pub last_error: Option<String>,
    pub attempts: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SmsMessage {
    pub fn new(phone_number: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            phone_number: phone_number.into(),
            body: body.into(),
            status: MessageStatus::Queued,
            last_error: None,
            attempts: 0,
            sent_at: None,
            last_attempt_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_sending(&mut self, now: DateTime<Utc>) {
        self.status = MessageStatus::Sending;
        self.last_attempt_at = Some(now);
    }

    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.status = MessageStatus::Sent;
        self.sent_at = Some(now);
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.status = MessageStatus::Failed;
        self.last_error = Some(error.into());
        self.attempts += 1;
    }
}

/// Notification content shared by push and in-app deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub subject: String,
    pub body: String,
    /// Free-form payload forwarded to the provider (deep links, badges, ...).
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        subject: impl Into<String>,
        body: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: subject.into(),
            body: body.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Per-recipient delivery state of a notification (push / in-app).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecipient {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub status: MessageStatus,
    pub last_error: Option<String>,
    pub attempts: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecipient {
    pub fn new(notification_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_id,
            user_id,
            status: MessageStatus::Queued,
            last_error: None,
            attempts: 0,
            sent_at: None,
            last_attempt_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_sending(&mut self, now: DateTime<Utc>) {
        self.status = MessageStatus::Sending;
        self.last_attempt_at = Some(now);
    }

    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.status = MessageStatus::Sent;
        self.sent_at = Some(now);
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.status = MessageStatus::Failed;
        self.last_error = Some(error.into());
        self.attempts += 1;
    }
}

// ============================================================================
// Device push tokens
// ============================================================================

/// A device's current push credential for a user.
///
/// At most one active token exists per (device_id, platform); registering a
/// new token deactivates the device's prior tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePushToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub platform: PushPlatform,
    pub token: String,
    pub active: bool,
    pub last_used_at: DateTime<Utc>,
    /// Set when the provider reported the token permanently invalid.
    /// One-way: only a fresh registration reactivates the device.
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DevicePushToken {
    pub fn new(
        user_id: Uuid,
        device_id: impl Into<String>,
        platform: PushPlatform,
        token: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            device_id: device_id.into(),
            platform,
            token: token.into(),
            active: true,
            last_used_at: now,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active && self.revoked_at.is_none()
    }

    pub fn mark_used(&mut self, now: DateTime<Utc>) {
        self.last_used_at = now;
        self.updated_at = now;
    }

    /// Fresh registration: reactivates the device, clearing any revocation.
    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.active = true;
        self.revoked_at = None;
        self.last_used_at = now;
        self.updated_at = now;
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.active = false;
        self.updated_at = now;
    }

    /// Provider reported the token permanently invalid.
    pub fn revoke(&mut self, now: DateTime<Utc>) {
        self.active = false;
        self.revoked_at = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record() -> OutboxRecord {
        OutboxRecord::new(Channel::Email, Uuid::new_v4(), "EMAIL_REQUESTED", 3)
    }

    #[test]
    fn test_new_record_is_pending_and_ready() {
        let record = record();
        assert_eq!(record.status, OutboxStatus::Pending);
        assert_eq!(record.attempt_count, 0);
        assert!(record.is_ready(Utc::now()));
        assert_eq!(record.partition_key.len(), 8);
    }

    #[test]
    fn test_processing_is_not_ready() {
        let mut record = record();
        record.mark_processing(Utc::now());
        assert_eq!(record.status, OutboxStatus::Processing);
        assert!(record.processing_started_at.is_some());
        assert!(!record.is_ready(Utc::now()));
    }

    #[test]
    fn test_failed_becomes_ready_once_backoff_elapses() {
        let now = Utc::now();
        let mut record = record();
        record.record_failure("SMTP: 451", &BackoffPolicy::email(), now);

        assert_eq!(record.status, OutboxStatus::Failed);
        assert_eq!(record.attempt_count, 1);
        let next = record.next_attempt_at.unwrap();
        assert_eq!(next, now + chrono::Duration::seconds(60));

        assert!(!record.is_ready(now));
        assert!(record.is_ready(next));
        assert!(record.is_ready(next + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_exhausted_record_is_terminal() {
        let now = Utc::now();
        let mut record = record();
        for _ in 0..3 {
            record.record_failure("boom", &BackoffPolicy::email(), now);
        }

        assert_eq!(record.attempt_count, 3);
        assert!(record.is_exhausted());
        assert_eq!(record.next_attempt_at, None);
        // Never ready again, however far into the future
        assert!(!record.is_ready(now + chrono::Duration::days(365)));
    }

    #[test]
    fn test_permanent_failure_skips_remaining_budget() {
        let now = Utc::now();
        let mut record = record();
        record.record_permanent_failure("INVALID_RECIPIENT: bad address", now);

        assert_eq!(record.status, OutboxStatus::Failed);
        assert_eq!(record.attempt_count, 1);
        assert_eq!(record.next_attempt_at, None);
        assert!(!record.is_ready(now + chrono::Duration::days(1)));
    }

    #[test]
    fn test_invalid_is_terminal() {
        let mut record = record();
        record.mark_invalid("email message not found");
        assert_eq!(record.status, OutboxStatus::Invalid);
        assert!(!record.is_ready(Utc::now() + chrono::Duration::days(1)));
    }

    #[test]
    fn test_reset_to_pending_clears_processing_state() {
        let mut record = record();
        record.mark_processing(Utc::now());
        record.reset_to_pending();
        assert_eq!(record.status, OutboxStatus::Pending);
        assert!(record.processing_started_at.is_none());
        assert!(record.is_ready(Utc::now()));
    }

    #[test]
    fn test_backoff_gaps_are_non_decreasing() {
        let backoff = BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(180));
        let now = Utc::now();
        let mut record = OutboxRecord::new(Channel::Sms, Uuid::new_v4(), "SMS_REQUESTED", 10);

        let mut previous_gap = chrono::Duration::zero();
        for _ in 0..8 {
            record.record_failure("x", &backoff, now);
            let gap = record.next_attempt_at.unwrap() - now;
            assert!(gap >= previous_gap);
            assert!(gap <= chrono::Duration::seconds(180));
            previous_gap = gap;
        }
    }

    #[test]
    fn test_email_payload_lifecycle() {
        let now = Utc::now();
        let mut email = EmailMessage::new("user@example.com", None, "Hi", "Hello");
        assert_eq!(email.status, MessageStatus::Queued);

        email.mark_sending(now);
        assert_eq!(email.status, MessageStatus::Sending);
        assert_eq!(email.last_attempt_at, Some(now));

        email.record_failure("TIMEOUT: provider call timed out");
        assert_eq!(email.status, MessageStatus::Failed);
        assert_eq!(email.attempts, 1);

        // Retry succeeds
        email.mark_sending(now);
        email.mark_sent(now);
        assert_eq!(email.status, MessageStatus::Sent);
        assert_eq!(email.sent_at, Some(now));
    }

    #[test]
    fn test_token_revocation_is_one_way() {
        let now = Utc::now();
        let mut token =
            DevicePushToken::new(Uuid::new_v4(), "device-1", PushPlatform::Fcm, "tok-abc");
        assert!(token.is_active());

        token.revoke(now);
        assert!(!token.is_active());
        assert!(token.revoked_at.is_some());

        token.mark_used(now);
        assert!(!token.is_active());

        // Only a fresh registration reactivates
        token.activate(now);
        assert!(token.is_active());
        assert!(token.revoked_at.is_none());
    }

    #[test]
    fn test_channel_string_forms() {
        assert_eq!(Channel::Email.to_string(), "EMAIL");
        assert_eq!(Channel::InApp.to_string(), "IN_APP");
        assert_eq!("PUSH".parse::<Channel>().unwrap(), Channel::Push);
        assert_eq!(MessageStatus::Sent.to_string(), "sent");
        assert_eq!(OutboxStatus::Processed.to_string(), "PROCESSED");
    }
}
