//! Outbox poller.
//!
//! Bridges durable intents to the queue transport. Each cycle claims a
//! batch of ready records under the repository's SKIP LOCKED discipline
//! and hands them to the queue; terminal success is recorded by the
//! consumer side, so a successfully handed-off record stays PROCESSING.
//!
//! Failures are local to a record: a failed queue publish schedules that
//! record's retry and the loop keeps going.

use chrono::{Duration as ChronoDuration, Utc};
use message_queue::MessageQueue;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::backoff::BackoffPolicy;
use crate::envelope::{OutboxEventMessage, QueueMessage};
use crate::error::NotificationResult;
use crate::models::OutboxRecord;
use crate::repository::OutboxRepository;

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Queue destination for outbox events.
    pub destination: String,

    /// Maximum records claimed per poll cycle.
    pub batch_size: u64,

    /// Records PROCESSING for longer than this with no terminal state are
    /// considered stuck and reset to PENDING.
    pub stuck_threshold: ChronoDuration,

    /// PROCESSED records older than this are deleted by the cleanup job.
    pub retention: ChronoDuration,

    /// Backoff schedule for failed queue publishes.
    pub publish_backoff: BackoffPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            destination: "notification:events".to_string(),
            batch_size: 100,
            stuck_threshold: ChronoDuration::hours(1),
            retention: ChronoDuration::days(7),
            publish_backoff: BackoffPolicy::queue_publish(),
        }
    }
}

impl PollerConfig {
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Polls the outbox store and publishes ready records to the queue.
pub struct OutboxPoller<R, Q> {
    outbox: Arc<R>,
    queue: Arc<Q>,
    config: PollerConfig,
}

impl<R, Q> OutboxPoller<R, Q>
where
    R: OutboxRepository,
    Q: MessageQueue,
{
    pub fn new(outbox: Arc<R>, queue: Arc<Q>, config: PollerConfig) -> Self {
        Self {
            outbox,
            queue,
            config,
        }
    }

    /// One poll cycle: claim ready records and hand them to the queue.
    ///
    /// Returns the number of records successfully handed off.
    pub async fn poll_and_dispatch(&self) -> NotificationResult<usize> {
        let now = Utc::now();
        let claimed = self.outbox.claim_ready(now, self.config.batch_size).await?;

        if claimed.is_empty() {
            trace!("No ready outbox records");
            return Ok(0);
        }

        info!(count = claimed.len(), "Processing outbox records");

        let mut dispatched = 0;
        for mut record in claimed {
            match self.publish_to_queue(&record).await {
                Ok(transport_id) => {
                    dispatched += 1;
                    debug!(
                        outbox_id = %record.id,
                        transport_id = %transport_id,
                        "Outbox record handed to queue"
                    );
                }
                Err(e) => {
                    warn!(
                        outbox_id = %record.id,
                        error = %e,
                        "Failed to publish outbox record to queue"
                    );
                    record.record_failure(
                        format!("QUEUE_PUBLISH: {e}"),
                        &self.config.publish_backoff,
                        Utc::now(),
                    );
                    if let Err(save_err) = self.outbox.update(&record).await {
                        error!(
                            outbox_id = %record.id,
                            error = %save_err,
                            "Failed to record queue publish failure"
                        );
                    }
                }
            }
        }

        Ok(dispatched)
    }

    async fn publish_to_queue(
        &self,
        record: &OutboxRecord,
    ) -> Result<String, message_queue::QueueError> {
        let event = OutboxEventMessage::from_record(record);
        let attributes = event.attributes();
        let envelope = QueueMessage::new(record.event_type.clone(), event);
        let body = envelope.to_json()?;

        self.queue
            .send(&self.config.destination, &body, &attributes)
            .await
    }

    /// Reset records stuck in PROCESSING (poller crashed mid-dispatch)
    /// back to PENDING. Run hourly.
    pub async fn reset_stuck(&self) -> NotificationResult<u64> {
        let threshold = Utc::now() - self.config.stuck_threshold;
        let reset = self.outbox.reset_stuck(threshold).await?;
        if reset > 0 {
            warn!(count = reset, "Reset stuck outbox records");
        }
        Ok(reset)
    }

    /// Delete old PROCESSED records. Run daily.
    pub async fn cleanup_processed(&self) -> NotificationResult<u64> {
        let threshold = Utc::now() - self.config.retention;
        let deleted = self.outbox.delete_processed_before(threshold).await?;
        info!(count = deleted, "Deleted old processed outbox records");
        Ok(deleted)
    }
}
