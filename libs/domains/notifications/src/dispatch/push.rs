//! Push channel dispatcher (FCM / APNs).
//!
//! A push dispatch fans out to every active, non-revoked device token of
//! the recipient. Tokens are attempted independently; the delivery is
//! considered sent if at least one device succeeds. Tokens failing with a
//! permanent provider error are revoked so future fan-outs skip them.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{bounded_send, ChannelDispatcher, DEFAULT_SEND_TIMEOUT};
use crate::backoff::BackoffPolicy;
use crate::envelope::OutboxEventMessage;
use crate::error::NotificationResult;
use crate::models::{Channel, MessageStatus, NotificationRecipient, OutboxRecord};
use crate::repository::{
    DeviceTokenRepository, NotificationRepository, OutboxRepository, RecipientRepository,
};
use crate::senders::{PushSender, SendResult};

pub struct PushDispatcher<O, R, N, D, S> {
    outbox: Arc<O>,
    recipients: Arc<R>,
    notifications: Arc<N>,
    devices: Arc<D>,
    sender: Arc<S>,
    backoff: BackoffPolicy,
    send_timeout: Duration,
}

impl<O, R, N, D, S> PushDispatcher<O, R, N, D, S>
where
    O: OutboxRepository,
    R: RecipientRepository,
    N: NotificationRepository,
    D: DeviceTokenRepository,
    S: PushSender,
{
    pub fn new(
        outbox: Arc<O>,
        recipients: Arc<R>,
        notifications: Arc<N>,
        devices: Arc<D>,
        sender: Arc<S>,
    ) -> Self {
        Self {
            outbox,
            recipients,
            notifications,
            devices,
            sender,
            backoff: BackoffPolicy::push(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    async fn handle_failure(
        &self,
        outbox: &mut OutboxRecord,
        recipient: &mut NotificationRecipient,
        label: &str,
        permanent: bool,
    ) -> NotificationResult<()> {
        let now = Utc::now();

        if permanent {
            outbox.record_permanent_failure(label, now);
        } else {
            outbox.record_failure(label, &self.backoff, now);
        }
        self.outbox.update(outbox).await?;

        recipient.record_failure(label);
        self.recipients.update(recipient).await?;

        if outbox.next_attempt_at.is_none() {
            error!(
                recipient_id = %recipient.id,
                attempts = %outbox.attempt_count,
                error = %label,
                "Push delivery permanently failed"
            );
        } else {
            warn!(
                recipient_id = %recipient.id,
                attempt = %outbox.attempt_count,
                max_attempts = %outbox.max_attempts,
                next_attempt_at = ?outbox.next_attempt_at,
                error = %label,
                "Push delivery failed, will retry"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl<O, R, N, D, S> ChannelDispatcher for PushDispatcher<O, R, N, D, S>
where
    O: OutboxRepository,
    R: RecipientRepository,
    N: NotificationRepository,
    D: DeviceTokenRepository,
    S: PushSender,
{
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn dispatch(&self, event: &OutboxEventMessage) -> NotificationResult<()> {
        let Some(mut outbox) = self.outbox.find_by_id(event.event_id).await? else {
            debug!(event_id = %event.event_id, "Outbox record not found, ignoring late delivery");
            return Ok(());
        };

        let Some(mut recipient) = self.recipients.find_by_id(event.message_id).await? else {
            warn!(
                event_id = %event.event_id,
                message_id = %event.message_id,
                "Notification recipient not found, marking outbox record invalid"
            );
            outbox.mark_invalid("notification recipient not found");
            self.outbox.update(&outbox).await?;
            return Ok(());
        };

        if recipient.status == MessageStatus::Sent {
            info!(recipient_id = %recipient.id, "Push already sent, skipping");
            outbox.mark_processed(Utc::now());
            self.outbox.update(&outbox).await?;
            return Ok(());
        }

        let Some(notification) = self
            .notifications
            .find_by_id(recipient.notification_id)
            .await?
        else {
            warn!(
                recipient_id = %recipient.id,
                notification_id = %recipient.notification_id,
                "Notification content not found, marking outbox record invalid"
            );
            outbox.mark_invalid("notification content not found");
            self.outbox.update(&outbox).await?;
            return Ok(());
        };

        let tokens = self.devices.find_active_by_user(recipient.user_id).await?;
        if tokens.is_empty() {
            // A registration arriving later creates new intents; waking
            // this one again cannot succeed.
            warn!(
                recipient_id = %recipient.id,
                user_id = %recipient.user_id,
                "No active push tokens for recipient"
            );
            return self
                .handle_failure(
                    &mut outbox,
                    &mut recipient,
                    "NO_ACTIVE_TOKENS: recipient has no active push tokens",
                    true,
                )
                .await;
        }

        let now = Utc::now();
        recipient.mark_sending(now);
        self.recipients.update(&recipient).await?;

        info!(
            recipient_id = %recipient.id,
            user_id = %recipient.user_id,
            token_count = tokens.len(),
            "Sending push notification"
        );

        let mut any_success = false;
        let mut last_error: Option<String> = None;

        for mut token in tokens {
            let result = bounded_send(
                self.send_timeout,
                self.sender.send_push(&token, &notification),
            )
            .await;

            if result.success {
                any_success = true;
                token.mark_used(now);
                self.devices.save(&token).await?;
                debug!(
                    token_id = %token.id,
                    provider_id = ?result.provider_id,
                    "Push sent to device"
                );
            } else {
                let label = result.error_label();
                warn!(
                    token_id = %token.id,
                    error = %label,
                    "Failed to send push to device"
                );
                if result.permanent {
                    token.revoke(now);
                    self.devices.save(&token).await?;
                    info!(token_id = %token.id, "Revoked invalid device token");
                }
                last_error = Some(label);
            }
        }

        if any_success {
            // OR semantics: one device reached means the delivery is sent,
            // even if other devices failed.
            recipient.mark_sent(now);
            self.recipients.update(&recipient).await?;

            outbox.mark_processed(now);
            self.outbox.update(&outbox).await?;

            info!(
                recipient_id = %recipient.id,
                "Push sent successfully to at least one device"
            );
            Ok(())
        } else {
            let label = last_error
                .unwrap_or_else(|| "PUSH_FAILED: failed to send to all devices".to_string());
            self.handle_failure(&mut outbox, &mut recipient, &label, false)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        MemoryDeviceTokenRepository, MemoryNotificationRepository, MemoryOutboxRepository,
        MemoryRecipientRepository,
    };
    use crate::models::{DevicePushToken, Notification, OutboxStatus, PushPlatform};
    use crate::senders::MockPushSender;
    use serde_json::json;
    use uuid::Uuid;

    struct Fixture {
        outbox: Arc<MemoryOutboxRepository>,
        recipients: Arc<MemoryRecipientRepository>,
        notifications: Arc<MemoryNotificationRepository>,
        devices: Arc<MemoryDeviceTokenRepository>,
        record: OutboxRecord,
        recipient: NotificationRecipient,
        user_id: Uuid,
        event: OutboxEventMessage,
    }

    async fn fixture() -> Fixture {
        let outbox = Arc::new(MemoryOutboxRepository::new());
        let recipients = Arc::new(MemoryRecipientRepository::new());
        let notifications = Arc::new(MemoryNotificationRepository::new());
        let devices = Arc::new(MemoryDeviceTokenRepository::new());

        let user_id = Uuid::new_v4();
        let notification = Notification::new("Order shipped", "Your order is on its way", json!({}));
        let recipient = NotificationRecipient::new(notification.id, user_id);
        let record = OutboxRecord::new(Channel::Push, recipient.id, "PUSH_REQUESTED", 3);

        notifications.insert(&notification).await.unwrap();
        recipients.insert(&recipient).await.unwrap();
        outbox.insert(&record).await.unwrap();

        let event = OutboxEventMessage::from_record(&record);
        Fixture {
            outbox,
            recipients,
            notifications,
            devices,
            record,
            recipient,
            user_id,
            event,
        }
    }

    fn dispatcher(
        f: &Fixture,
        sender: MockPushSender,
    ) -> PushDispatcher<
        MemoryOutboxRepository,
        MemoryRecipientRepository,
        MemoryNotificationRepository,
        MemoryDeviceTokenRepository,
        MockPushSender,
    > {
        PushDispatcher::new(
            Arc::clone(&f.outbox),
            Arc::clone(&f.recipients),
            Arc::clone(&f.notifications),
            Arc::clone(&f.devices),
            Arc::new(sender),
        )
    }

    #[tokio::test]
    async fn test_or_semantics_one_success_two_failures() {
        let f = fixture().await;

        let ok = DevicePushToken::new(f.user_id, "dev-ok", PushPlatform::Fcm, "tok-ok");
        let invalid = DevicePushToken::new(f.user_id, "dev-bad", PushPlatform::Fcm, "tok-invalid");
        let flaky = DevicePushToken::new(f.user_id, "dev-flaky", PushPlatform::Apns, "tok-flaky");
        for token in [&ok, &invalid, &flaky] {
            f.devices.save(token).await.unwrap();
        }

        let mut sender = MockPushSender::new();
        sender.expect_send_push().times(3).returning(|token, _| {
            Ok(match token.token.as_str() {
                "tok-ok" => SendResult::success("fcm-1", "FCM"),
                "tok-invalid" => SendResult::permanent_failure("unregistered", "INVALID_TOKEN"),
                _ => SendResult::failure("service unavailable", "UNAVAILABLE"),
            })
        });

        dispatcher(&f, sender).dispatch(&f.event).await.unwrap();

        // Aggregate delivery is sent even though two devices failed
        let recipient = f
            .recipients
            .find_by_id(f.recipient.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recipient.status, MessageStatus::Sent);

        let outbox = f.outbox.find_by_id(f.record.id).await.unwrap().unwrap();
        assert_eq!(outbox.status, OutboxStatus::Processed);

        // Exactly the permanently-failing token is revoked
        let invalid = f.devices.find_by_id(invalid.id).await.unwrap().unwrap();
        assert!(!invalid.is_active());
        assert!(invalid.revoked_at.is_some());

        let flaky = f.devices.find_by_id(flaky.id).await.unwrap().unwrap();
        assert!(flaky.is_active());
        assert!(flaky.revoked_at.is_none());

        // The successful token's last_used_at advanced
        let ok_after = f.devices.find_by_id(ok.id).await.unwrap().unwrap();
        assert!(ok_after.last_used_at >= ok.last_used_at);
    }

    #[tokio::test]
    async fn test_all_devices_fail_is_retryable() {
        let f = fixture().await;
        f.devices
            .save(&DevicePushToken::new(
                f.user_id,
                "dev-1",
                PushPlatform::Fcm,
                "tok-1",
            ))
            .await
            .unwrap();

        let mut sender = MockPushSender::new();
        sender
            .expect_send_push()
            .times(1)
            .returning(|_, _| Ok(SendResult::failure("service unavailable", "UNAVAILABLE")));

        dispatcher(&f, sender).dispatch(&f.event).await.unwrap();

        let outbox = f.outbox.find_by_id(f.record.id).await.unwrap().unwrap();
        assert_eq!(outbox.status, OutboxStatus::Failed);
        assert_eq!(outbox.attempt_count, 1);
        // Push backoff starts at 1s
        assert!(outbox.next_attempt_at.is_some());

        let recipient = f
            .recipients
            .find_by_id(f.recipient.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recipient.status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn test_no_active_tokens_is_terminal() {
        let f = fixture().await;

        let mut sender = MockPushSender::new();
        sender.expect_send_push().times(0);

        dispatcher(&f, sender).dispatch(&f.event).await.unwrap();

        let outbox = f.outbox.find_by_id(f.record.id).await.unwrap().unwrap();
        assert_eq!(outbox.status, OutboxStatus::Failed);
        assert_eq!(outbox.next_attempt_at, None);
        assert!(outbox.last_error.unwrap().starts_with("NO_ACTIVE_TOKENS"));
    }

    #[tokio::test]
    async fn test_revoked_tokens_are_skipped_in_future_fanouts() {
        let f = fixture().await;

        let invalid = DevicePushToken::new(f.user_id, "dev-bad", PushPlatform::Fcm, "tok-invalid");
        let ok = DevicePushToken::new(f.user_id, "dev-ok", PushPlatform::Fcm, "tok-ok");
        f.devices.save(&invalid).await.unwrap();
        f.devices.save(&ok).await.unwrap();

        let mut sender = MockPushSender::new();
        // First dispatch: both tokens attempted, one revoked. The retry
        // only sees the surviving token.
        sender.expect_send_push().times(3).returning(|token, _| {
            Ok(match token.token.as_str() {
                "tok-invalid" => SendResult::permanent_failure("unregistered", "INVALID_TOKEN"),
                _ => SendResult::failure("service unavailable", "UNAVAILABLE"),
            })
        });

        let dispatcher = dispatcher(&f, sender);
        dispatcher.dispatch(&f.event).await.unwrap();
        dispatcher.dispatch(&f.event).await.unwrap();

        let invalid = f.devices.find_by_id(invalid.id).await.unwrap().unwrap();
        assert!(invalid.revoked_at.is_some());
        // 2 tokens on the first dispatch + 1 on the second = 3 sends total,
        // enforced by the times(3) expectation above.
    }

    #[tokio::test]
    async fn test_missing_recipient_marks_invalid() {
        let f = fixture().await;
        let mut sender = MockPushSender::new();
        sender.expect_send_push().times(0);

        let event = OutboxEventMessage {
            message_id: Uuid::new_v4(),
            ..f.event.clone()
        };
        dispatcher(&f, sender).dispatch(&event).await.unwrap();

        let outbox = f.outbox.find_by_id(f.record.id).await.unwrap().unwrap();
        assert_eq!(outbox.status, OutboxStatus::Invalid);
    }

    #[tokio::test]
    async fn test_redelivery_after_success_is_idempotent() {
        let f = fixture().await;
        f.devices
            .save(&DevicePushToken::new(
                f.user_id,
                "dev-1",
                PushPlatform::Fcm,
                "tok-1",
            ))
            .await
            .unwrap();

        let mut sender = MockPushSender::new();
        sender
            .expect_send_push()
            .times(1)
            .returning(|_, _| Ok(SendResult::success("fcm-1", "FCM")));

        let dispatcher = dispatcher(&f, sender);
        dispatcher.dispatch(&f.event).await.unwrap();
        dispatcher.dispatch(&f.event).await.unwrap();

        let outbox = f.outbox.find_by_id(f.record.id).await.unwrap().unwrap();
        assert_eq!(outbox.status, OutboxStatus::Processed);
    }
}
