//! SMS channel dispatcher.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{bounded_send, ChannelDispatcher, DEFAULT_SEND_TIMEOUT};
use crate::backoff::BackoffPolicy;
use crate::envelope::OutboxEventMessage;
use crate::error::NotificationResult;
use crate::models::{Channel, MessageStatus, OutboxRecord, SmsMessage};
use crate::repository::{OutboxRepository, SmsMessageRepository};
use crate::senders::{SendResult, SmsSender};

pub struct SmsDispatcher<O, M, S> {
    outbox: Arc<O>,
    messages: Arc<M>,
    sender: Arc<S>,
    backoff: BackoffPolicy,
    send_timeout: Duration,
}

impl<O, M, S> SmsDispatcher<O, M, S>
where
    O: OutboxRepository,
    M: SmsMessageRepository,
    S: SmsSender,
{
    pub fn new(outbox: Arc<O>, messages: Arc<M>, sender: Arc<S>) -> Self {
        Self {
            outbox,
            messages,
            sender,
            backoff: BackoffPolicy::sms(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    async fn send(&self, outbox: &mut OutboxRecord, sms: &mut SmsMessage) -> NotificationResult<()> {
        let now = Utc::now();
        sms.mark_sending(now);
        self.messages.update(sms).await?;

        info!(sms_id = %sms.id, to = %sms.phone_number, "Sending SMS");
        let result = bounded_send(self.send_timeout, self.sender.send_sms(sms)).await;

        if result.success {
            sms.mark_sent(now);
            self.messages.update(sms).await?;

            outbox.mark_processed(now);
            self.outbox.update(outbox).await?;

            info!(
                sms_id = %sms.id,
                provider_id = ?result.provider_id,
                "SMS sent successfully"
            );
            Ok(())
        } else {
            self.handle_failure(outbox, sms, &result).await
        }
    }

    async fn handle_failure(
        &self,
        outbox: &mut OutboxRecord,
        sms: &mut SmsMessage,
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

        sms.record_failure(&label);
        self.messages.update(sms).await?;

        if outbox.next_attempt_at.is_none() {
            error!(
                sms_id = %sms.id,
                attempts = %outbox.attempt_count,
                error = %label,
                "SMS delivery permanently failed"
            );
        } else {
            warn!(
                sms_id = %sms.id,
                attempt = %outbox.attempt_count,
                max_attempts = %outbox.max_attempts,
                next_attempt_at = ?outbox.next_attempt_at,
                error = %label,
                "SMS delivery failed, will retry"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl<O, M, S> ChannelDispatcher for SmsDispatcher<O, M, S>
where
    O: OutboxRepository,
    M: SmsMessageRepository,
    S: SmsSender,
{
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn dispatch(&self, event: &OutboxEventMessage) -> NotificationResult<()> {
        let Some(mut outbox) = self.outbox.find_by_id(event.event_id).await? else {
            debug!(event_id = %event.event_id, "Outbox record not found, ignoring late delivery");
            return Ok(());
        };

        let Some(mut sms) = self.messages.find_by_id(event.message_id).await? else {
            warn!(
                event_id = %event.event_id,
                message_id = %event.message_id,
                "SMS message not found, marking outbox record invalid"
            );
            outbox.mark_invalid("sms message not found");
            self.outbox.update(&outbox).await?;
            return Ok(());
        };

        if sms.status == MessageStatus::Sent {
            info!(sms_id = %sms.id, "SMS already sent, skipping");
            outbox.mark_processed(Utc::now());
            self.outbox.update(&outbox).await?;
            return Ok(());
        }

        self.send(&mut outbox, &mut sms).await
    }
}
