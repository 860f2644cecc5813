//! In-memory transport for tests and local development
//!
//! Mirrors the semantics of the Redis transport on a smaller scale:
//! at-least-once, unacknowledged messages can be made visible again, and
//! delayed messages stay invisible until due. All state is process-local.

use crate::error::QueueError;
use crate::queue::{Attributes, MessageQueue, QueueReceiver, ReceivedMessage};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredMessage {
    transport_id: String,
    body: String,
    attributes: Attributes,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<StoredMessage>,
    delayed: Vec<(i64, StoredMessage)>,
    in_flight: HashMap<String, StoredMessage>,
}

/// Process-local implementation of [`MessageQueue`].
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    inner: Arc<Mutex<HashMap<String, QueueState>>>,
    counter: Arc<AtomicU64>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a receiver bound to one destination, sharing this queue's state.
    pub fn receiver(&self, destination: impl Into<String>) -> InMemoryReceiver {
        InMemoryReceiver {
            inner: Arc::clone(&self.inner),
            destination: destination.into(),
        }
    }

    /// Make all in-flight (received but unacked) messages visible again.
    ///
    /// Simulates a visibility timeout expiring, e.g. after a consumer crash.
    pub fn redeliver_unacked(&self, destination: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(state) = inner.get_mut(destination) {
            let redelivered: Vec<StoredMessage> = state.in_flight.drain().map(|(_, m)| m).collect();
            for message in redelivered {
                state.pending.push_back(message);
            }
        }
    }

    /// Number of messages waiting to be received.
    pub fn pending_len(&self, destination: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.get(destination).map_or(0, |s| s.pending.len())
    }

    /// Number of received-but-unacked messages.
    pub fn in_flight_len(&self, destination: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.get(destination).map_or(0, |s| s.in_flight.len())
    }

    fn next_id(&self) -> String {
        format!("mem-{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn send(
        &self,
        destination: &str,
        body: &str,
        attributes: &Attributes,
    ) -> Result<String, QueueError> {
        let id = self.next_id();
        let mut inner = self.inner.lock().unwrap();
        let state = inner.entry(destination.to_string()).or_default();
        state.pending.push_back(StoredMessage {
            transport_id: id.clone(),
            body: body.to_string(),
            attributes: attributes.clone(),
            delivery_count: 0,
        });
        Ok(id)
    }

    async fn send_with_delay(
        &self,
        destination: &str,
        body: &str,
        delay: Duration,
        attributes: &Attributes,
    ) -> Result<String, QueueError> {
        if delay.is_zero() {
            return self.send(destination, body, attributes).await;
        }

        let id = self.next_id();
        let due_at_ms = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let mut inner = self.inner.lock().unwrap();
        let state = inner.entry(destination.to_string()).or_default();
        state.delayed.push((
            due_at_ms,
            StoredMessage {
                transport_id: id.clone(),
                body: body.to_string(),
                attributes: attributes.clone(),
                delivery_count: 0,
            },
        ));
        Ok(id)
    }

    async fn is_healthy(&self, _destination: &str) -> bool {
        true
    }
}

/// Process-local implementation of [`QueueReceiver`].
#[derive(Clone)]
pub struct InMemoryReceiver {
    inner: Arc<Mutex<HashMap<String, QueueState>>>,
    destination: String,
}

#[async_trait]
impl QueueReceiver for InMemoryReceiver {
    async fn receive(
        &self,
        max_messages: usize,
        _wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.entry(self.destination.clone()).or_default();

        // Promote due delayed messages
        let now_ms = chrono::Utc::now().timestamp_millis();
        let (due, not_due): (Vec<_>, Vec<_>) = state
            .delayed
            .drain(..)
            .partition(|(due_at, _)| *due_at <= now_ms);
        state.delayed = not_due;
        for (_, message) in due {
            state.pending.push_back(message);
        }

        let mut batch = Vec::new();
        while batch.len() < max_messages {
            let Some(mut message) = state.pending.pop_front() else {
                break;
            };
            message.delivery_count += 1;
            state
                .in_flight
                .insert(message.transport_id.clone(), message.clone());
            batch.push(ReceivedMessage {
                transport_id: message.transport_id,
                body: message.body,
                attributes: message.attributes,
                delivery_count: message.delivery_count,
            });
        }

        Ok(batch)
    }

    async fn ack(&self, transport_id: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(state) = inner.get_mut(&self.destination) {
            state.in_flight.remove(transport_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEST: &str = "test:events";

    #[tokio::test]
    async fn test_send_receive_ack_roundtrip() {
        let queue = InMemoryQueue::new();
        let receiver = queue.receiver(DEST);

        let mut attributes = Attributes::new();
        attributes.insert("eventType".to_string(), "EMAIL_REQUESTED".to_string());
        queue.send(DEST, "hello", &attributes).await.unwrap();

        let batch = receiver.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "hello");
        assert_eq!(batch[0].delivery_count, 1);
        assert_eq!(
            batch[0].attributes.get("eventType").map(String::as_str),
            Some("EMAIL_REQUESTED")
        );

        receiver.ack(&batch[0].transport_id).await.unwrap();
        assert_eq!(queue.in_flight_len(DEST), 0);

        // Acked messages are never redelivered
        queue.redeliver_unacked(DEST);
        let batch = receiver.receive(10, Duration::ZERO).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_unacked_messages_are_redelivered() {
        let queue = InMemoryQueue::new();
        let receiver = queue.receiver(DEST);

        queue.send(DEST, "m1", &Attributes::new()).await.unwrap();

        let first = receiver.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].delivery_count, 1);

        // No ack: visibility timeout expires
        queue.redeliver_unacked(DEST);

        let second = receiver.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].delivery_count, 2);
        assert!(second[0].is_redelivery());
        assert_eq!(second[0].body, "m1");
    }

    #[tokio::test]
    async fn test_delayed_message_invisible_until_due() {
        let queue = InMemoryQueue::new();
        let receiver = queue.receiver(DEST);

        queue
            .send_with_delay(DEST, "later", Duration::from_millis(50), &Attributes::new())
            .await
            .unwrap();

        let batch = receiver.receive(10, Duration::ZERO).await.unwrap();
        assert!(batch.is_empty());

        tokio::time::sleep(Duration::from_millis(60)).await;

        let batch = receiver.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].body, "later");
    }

    #[tokio::test]
    async fn test_batch_respects_max_messages() {
        let queue = InMemoryQueue::new();
        let receiver = queue.receiver(DEST);

        for i in 0..5 {
            queue
                .send(DEST, &format!("m{i}"), &Attributes::new())
                .await
                .unwrap();
        }

        let batch = receiver.receive(3, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.pending_len(DEST), 2);
    }
}
