//! In-app channel dispatcher (WebSocket/SSE).
//!
//! An in-app notification for a disconnected user is not a failure: the
//! row is already persisted and shows up on the next refresh, so a
//! `USER_NOT_CONNECTED` result settles the delivery as sent.

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
use crate::repository::{NotificationRepository, OutboxRepository, RecipientRepository};
use crate::senders::{InAppSender, SendResult};

const USER_NOT_CONNECTED: &str = "USER_NOT_CONNECTED";

pub struct InAppDispatcher<O, R, N, S> {
    outbox: Arc<O>,
    recipients: Arc<R>,
    notifications: Arc<N>,
    sender: Arc<S>,
    backoff: BackoffPolicy,
    send_timeout: Duration,
}

impl<O, R, N, S> InAppDispatcher<O, R, N, S>
where
    O: OutboxRepository,
    R: RecipientRepository,
    N: NotificationRepository,
    S: InAppSender,
{
    pub fn new(outbox: Arc<O>, recipients: Arc<R>, notifications: Arc<N>, sender: Arc<S>) -> Self {
        Self {
            outbox,
            recipients,
            notifications,
            sender,
            backoff: BackoffPolicy::in_app(),
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
        result: &SendResult,
    ) -> NotificationResult<()> {
        let label = result.error_label();
        let now = Utc::now();

        if result.permanent {
            outbox.record_permanent_failure(&label, now);
        } else {
            outbox.record_failure(&label, &self.backoff, now);
        }
        self.outbox.update(outbox).await?;

        recipient.record_failure(&label);
        self.recipients.update(recipient).await?;

        if outbox.next_attempt_at.is_none() {
            error!(
                recipient_id = %recipient.id,
                attempts = %outbox.attempt_count,
                error = %label,
                "In-app delivery permanently failed"
            );
        } else {
            warn!(
                recipient_id = %recipient.id,
                attempt = %outbox.attempt_count,
                next_attempt_at = ?outbox.next_attempt_at,
                error = %label,
                "In-app delivery failed, will retry"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl<O, R, N, S> ChannelDispatcher for InAppDispatcher<O, R, N, S>
where
    O: OutboxRepository,
    R: RecipientRepository,
    N: NotificationRepository,
    S: InAppSender,
{
    fn channel(&self) -> Channel {
        Channel::InApp
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
            info!(recipient_id = %recipient.id, "In-app notification already sent, skipping");
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

        let now = Utc::now();
        recipient.mark_sending(now);
        self.recipients.update(&recipient).await?;

        info!(
            recipient_id = %recipient.id,
            user_id = %recipient.user_id,
            "Sending in-app notification"
        );
        let result = bounded_send(
            self.send_timeout,
            self.sender.send_in_app(recipient.user_id, &notification),
        )
        .await;

        if result.success {
            recipient.mark_sent(now);
            self.recipients.update(&recipient).await?;

            outbox.mark_processed(now);
            self.outbox.update(&outbox).await?;

            info!(
                recipient_id = %recipient.id,
                provider_id = ?result.provider_id,
                "In-app notification sent successfully"
            );
            Ok(())
        } else if result.error_code.as_deref() == Some(USER_NOT_CONNECTED) {
            // Persisted row is visible on reconnect/refresh
            recipient.mark_sent(now);
            self.recipients.update(&recipient).await?;

            outbox.mark_processed(now);
            self.outbox.update(&outbox).await?;

            info!(
                recipient_id = %recipient.id,
                "In-app notification queued for offline user"
            );
            Ok(())
        } else {
            self.handle_failure(&mut outbox, &mut recipient, &result).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{
        MemoryNotificationRepository, MemoryOutboxRepository, MemoryRecipientRepository,
    };
    use crate::models::{Notification, OutboxStatus};
    use crate::senders::MockInAppSender;
    use serde_json::json;
    use uuid::Uuid;

    struct Fixture {
        outbox: Arc<MemoryOutboxRepository>,
        recipients: Arc<MemoryRecipientRepository>,
        notifications: Arc<MemoryNotificationRepository>,
        record: OutboxRecord,
        recipient: NotificationRecipient,
        event: OutboxEventMessage,
    }

    async fn fixture() -> Fixture {
        let outbox = Arc::new(MemoryOutboxRepository::new());
        let recipients = Arc::new(MemoryRecipientRepository::new());
        let notifications = Arc::new(MemoryNotificationRepository::new());

        let notification = Notification::new("Reminder", "Standup in 5 minutes", json!({}));
        let recipient = NotificationRecipient::new(notification.id, Uuid::new_v4());
        let record = OutboxRecord::new(Channel::InApp, recipient.id, "IN_APP_REQUESTED", 3);

        notifications.insert(&notification).await.unwrap();
        recipients.insert(&recipient).await.unwrap();
        outbox.insert(&record).await.unwrap();

        let event = OutboxEventMessage::from_record(&record);
        Fixture {
            outbox,
            recipients,
            notifications,
            record,
            recipient,
            event,
        }
    }

    fn dispatcher(
        f: &Fixture,
        sender: MockInAppSender,
    ) -> InAppDispatcher<
        MemoryOutboxRepository,
        MemoryRecipientRepository,
        MemoryNotificationRepository,
        MockInAppSender,
    > {
        InAppDispatcher::new(
            Arc::clone(&f.outbox),
            Arc::clone(&f.recipients),
            Arc::clone(&f.notifications),
            Arc::new(sender),
        )
    }

    #[tokio::test]
    async fn test_connected_user_receives_notification() {
        let f = fixture().await;
        let mut sender = MockInAppSender::new();
        sender
            .expect_send_in_app()
            .times(1)
            .returning(|_, _| Ok(SendResult::success("ws-1", "IN_APP_WS")));

        dispatcher(&f, sender).dispatch(&f.event).await.unwrap();

        let recipient = f
            .recipients
            .find_by_id(f.recipient.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recipient.status, MessageStatus::Sent);
        assert_eq!(
            f.outbox.find_by_id(f.record.id).await.unwrap().unwrap().status,
            OutboxStatus::Processed
        );
    }

    #[tokio::test]
    async fn test_offline_user_counts_as_sent() {
        let f = fixture().await;
        let mut sender = MockInAppSender::new();
        sender.expect_send_in_app().times(1).returning(|_, _| {
            Ok(SendResult::failure("no active session", USER_NOT_CONNECTED))
        });

        dispatcher(&f, sender).dispatch(&f.event).await.unwrap();

        let recipient = f
            .recipients
            .find_by_id(f.recipient.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recipient.status, MessageStatus::Sent);
        assert_eq!(
            f.outbox.find_by_id(f.record.id).await.unwrap().unwrap().status,
            OutboxStatus::Processed
        );
    }

    #[tokio::test]
    async fn test_other_failures_schedule_retry() {
        let f = fixture().await;
        let mut sender = MockInAppSender::new();
        sender
            .expect_send_in_app()
            .times(1)
            .returning(|_, _| Ok(SendResult::failure("broker down", "BROKER_ERROR")));

        dispatcher(&f, sender).dispatch(&f.event).await.unwrap();

        let outbox = f.outbox.find_by_id(f.record.id).await.unwrap().unwrap();
        assert_eq!(outbox.status, OutboxStatus::Failed);
        assert!(outbox.next_attempt_at.is_some());

        let recipient = f
            .recipients
            .find_by_id(f.recipient.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recipient.status, MessageStatus::Failed);
    }
}
