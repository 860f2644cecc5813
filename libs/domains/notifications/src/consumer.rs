//! Queue consumer.
//!
//! Long-polls the transport for batches of outbox events and routes each to
//! its channel dispatcher. The consumer performs no local retry loop:
//!
//! - successful routing acknowledges (deletes) the transport message;
//! - a routing error leaves the message unacknowledged, so the transport's
//!   visibility-timeout redelivery governs retries;
//! - malformed payloads are logged and left unacknowledged as well, so
//!   they surface through the transport's DLQ policy instead of being
//!   silently dropped.

use message_queue::{QueueReceiver, ReceivedMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::dispatch::DispatcherRegistry;
use crate::envelope::{OutboxEventMessage, QueueMessage};
use crate::error::NotificationResult;

/// Consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Maximum messages per receive batch.
    pub max_messages: usize,

    /// Long-poll wait for a batch.
    pub wait: Duration,

    /// Pause after an empty batch before polling again.
    pub idle_backoff: Duration,

    /// Pause after a transport error before polling again.
    pub error_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait: Duration::from_secs(20),
            idle_backoff: Duration::from_millis(100),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// Consumes outbox events from the queue and dispatches them per channel.
pub struct EventConsumer<C> {
    receiver: Arc<C>,
    registry: Arc<DispatcherRegistry>,
    config: ConsumerConfig,
}

impl<C> EventConsumer<C>
where
    C: QueueReceiver,
{
    pub fn new(receiver: Arc<C>, registry: Arc<DispatcherRegistry>, config: ConsumerConfig) -> Self {
        Self {
            receiver,
            registry,
            config,
        }
    }

    /// Run the consumer loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> NotificationResult<()> {
        info!(
            max_messages = self.config.max_messages,
            wait_secs = self.config.wait.as_secs(),
            "Starting notification event consumer"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.receiver.receive(self.config.max_messages, self.config.wait).await {
                Ok(batch) => {
                    if batch.is_empty() {
                        tokio::select! {
                            _ = shutdown.changed() => {}
                            _ = tokio::time::sleep(self.config.idle_backoff) => {}
                        }
                        continue;
                    }
                    info!(count = batch.len(), "Received messages from queue");
                    for message in batch {
                        self.process_message(message).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Error polling queue");
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        info!("Notification event consumer stopped");
        Ok(())
    }

    /// Process one transport message.
    ///
    /// Only fully-routed messages are acknowledged; everything else stays
    /// on the transport for redelivery.
    pub async fn process_message(&self, message: ReceivedMessage) {
        debug!(
            transport_id = %message.transport_id,
            redelivery = message.is_redelivery(),
            "Processing message"
        );

        let envelope: QueueMessage<OutboxEventMessage> =
            match QueueMessage::from_json(&message.body) {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!(
                        transport_id = %message.transport_id,
                        error = %e,
                        "Malformed queue message, leaving for transport retry/DLQ"
                    );
                    return;
                }
            };
        let event = envelope.payload;

        let dispatcher = match self.registry.get(event.channel) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                // Wiring defect: scream, never silently drop
                error!(
                    event_id = %event.event_id,
                    channel = %event.channel,
                    error = %e,
                    "No dispatcher registered for channel"
                );
                return;
            }
        };

        match dispatcher.dispatch(&event).await {
            Ok(()) => {
                if let Err(e) = self.receiver.ack(&message.transport_id).await {
                    error!(
                        transport_id = %message.transport_id,
                        error = %e,
                        "Failed to acknowledge message"
                    );
                }
                debug!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    "Message processed"
                );
            }
            Err(e) => {
                error!(
                    event_id = %event.event_id,
                    error = %e,
                    "Dispatch failed, leaving message for redelivery"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ChannelDispatcher;
    use crate::models::{Channel, OutboxRecord};
    use async_trait::async_trait;
    use message_queue::{Attributes, InMemoryQueue, MessageQueue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    const DEST: &str = "notification:events";

    struct CountingDispatcher {
        channel: Channel,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingDispatcher {
        fn new(channel: Channel, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                channel,
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl ChannelDispatcher for CountingDispatcher {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn dispatch(&self, _event: &OutboxEventMessage) -> NotificationResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(crate::error::NotificationError::Database(
                    "connection lost".to_string(),
                ))
            } else {
                Ok(())
            }
        }
    }

    async fn enqueue_event(queue: &InMemoryQueue, channel: Channel) -> OutboxEventMessage {
        let record = OutboxRecord::new(channel, Uuid::new_v4(), "EMAIL_REQUESTED", 3);
        let event = OutboxEventMessage::from_record(&record);
        let envelope = QueueMessage::new(record.event_type.clone(), event.clone());
        queue
            .send(DEST, &envelope.to_json().unwrap(), &Attributes::new())
            .await
            .unwrap();
        event
    }

    #[tokio::test]
    async fn test_successful_routing_acks_the_message() {
        let queue = InMemoryQueue::new();
        let dispatcher = CountingDispatcher::new(Channel::Email, false);
        let registry = Arc::new(DispatcherRegistry::new().register(dispatcher.clone()));
        let consumer = EventConsumer::new(
            Arc::new(queue.receiver(DEST)),
            registry,
            ConsumerConfig::default(),
        );

        enqueue_event(&queue, Channel::Email).await;
        let batch = queue
            .receiver(DEST)
            .receive(10, Duration::ZERO)
            .await
            .unwrap();
        consumer.process_message(batch.into_iter().next().unwrap()).await;

        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.in_flight_len(DEST), 0);

        // Nothing comes back even after a visibility timeout
        queue.redeliver_unacked(DEST);
        assert_eq!(queue.pending_len(DEST), 0);
    }

    #[tokio::test]
    async fn test_dispatch_error_leaves_message_unacked() {
        let queue = InMemoryQueue::new();
        let dispatcher = CountingDispatcher::new(Channel::Email, true);
        let registry = Arc::new(DispatcherRegistry::new().register(dispatcher.clone()));
        let receiver = Arc::new(queue.receiver(DEST));
        let consumer = EventConsumer::new(Arc::clone(&receiver), registry, ConsumerConfig::default());

        enqueue_event(&queue, Channel::Email).await;
        let batch = receiver.receive(10, Duration::ZERO).await.unwrap();
        consumer.process_message(batch.into_iter().next().unwrap()).await;

        // Transport-driven redelivery: the message becomes visible again
        assert_eq!(queue.in_flight_len(DEST), 1);
        queue.redeliver_unacked(DEST);
        let batch = receiver.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch[0].is_redelivery());
    }

    #[tokio::test]
    async fn test_malformed_message_is_not_acked() {
        let queue = InMemoryQueue::new();
        let registry = Arc::new(
            DispatcherRegistry::new().register(CountingDispatcher::new(Channel::Email, false)),
        );
        let receiver = Arc::new(queue.receiver(DEST));
        let consumer = EventConsumer::new(Arc::clone(&receiver), registry, ConsumerConfig::default());

        queue
            .send(DEST, "this is not json", &Attributes::new())
            .await
            .unwrap();
        let batch = receiver.receive(10, Duration::ZERO).await.unwrap();
        consumer.process_message(batch.into_iter().next().unwrap()).await;

        // Left for the transport's retry/DLQ policy, not silently dropped
        assert_eq!(queue.in_flight_len(DEST), 1);
    }

    #[tokio::test]
    async fn test_unknown_channel_fails_loudly_without_ack() {
        let queue = InMemoryQueue::new();
        // Only email is registered; a push event has nowhere to go
        let registry = Arc::new(
            DispatcherRegistry::new().register(CountingDispatcher::new(Channel::Email, false)),
        );
        let receiver = Arc::new(queue.receiver(DEST));
        let consumer = EventConsumer::new(Arc::clone(&receiver), registry, ConsumerConfig::default());

        enqueue_event(&queue, Channel::Push).await;
        let batch = receiver.receive(10, Duration::ZERO).await.unwrap();
        consumer.process_message(batch.into_iter().next().unwrap()).await;

        assert_eq!(queue.in_flight_len(DEST), 1);
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_stops_on_shutdown() {
        let queue = InMemoryQueue::new();
        let dispatcher = CountingDispatcher::new(Channel::Email, false);
        let registry = Arc::new(DispatcherRegistry::new().register(dispatcher.clone()));
        let consumer = EventConsumer::new(
            Arc::new(queue.receiver(DEST)),
            registry,
            ConsumerConfig {
                max_messages: 10,
                wait: Duration::from_millis(5),
                idle_backoff: Duration::from_millis(5),
                error_backoff: Duration::from_millis(5),
            },
        );

        for _ in 0..3 {
            enqueue_event(&queue, Channel::Email).await;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { consumer.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(queue.pending_len(DEST), 0);
        assert_eq!(queue.in_flight_len(DEST), 0);
    }
}
