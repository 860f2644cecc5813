//! Redis Streams transport
//!
//! Producer: XADD with approximate MAXLEN trimming; delayed messages go to
//! a `{destination}:delayed` sorted set scored by their due time and are
//! promoted to the stream when due.
//!
//! Consumer: consumer groups (XREADGROUP / XACK). Messages left
//! unacknowledged past the claim-idle threshold are taken over with
//! XAUTOCLAIM, which is what gives the transport its visibility-timeout
//! redelivery semantics.

use crate::error::QueueError;
use crate::queue::{Attributes, MessageQueue, QueueReceiver, ReceivedMessage};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const BODY_FIELD: &str = "body";
const ATTR_PREFIX: &str = "attr:";

/// A delayed message parked in the `{destination}:delayed` sorted set.
#[derive(Debug, Serialize, Deserialize)]
struct DelayedEnvelope {
    id: String,
    body: String,
    attributes: Attributes,
}

/// Redis Streams implementation of [`MessageQueue`].
#[derive(Clone)]
pub struct RedisStreamQueue {
    redis: ConnectionManager,
    max_length: i64,
}

impl RedisStreamQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            max_length: 100_000,
        }
    }

    /// Set the maximum stream length (MAXLEN ~).
    pub fn with_max_length(mut self, max_length: i64) -> Self {
        self.max_length = max_length;
        self
    }

    async fn xadd(
        &self,
        destination: &str,
        body: &str,
        attributes: &Attributes,
    ) -> Result<String, QueueError> {
        let mut conn = self.redis.clone();

        let mut cmd = redis::cmd("XADD");
        cmd.arg(destination)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*")
            .arg(BODY_FIELD)
            .arg(body);

        for (key, value) in attributes {
            cmd.arg(format!("{ATTR_PREFIX}{key}")).arg(value);
        }

        let stream_id: String = cmd.query_async(&mut conn).await?;

        debug!(
            destination = %destination,
            stream_id = %stream_id,
            "Message sent to stream"
        );

        Ok(stream_id)
    }
}

#[async_trait]
impl MessageQueue for RedisStreamQueue {
    async fn send(
        &self,
        destination: &str,
        body: &str,
        attributes: &Attributes,
    ) -> Result<String, QueueError> {
        self.xadd(destination, body, attributes).await
    }

    async fn send_with_delay(
        &self,
        destination: &str,
        body: &str,
        delay: Duration,
        attributes: &Attributes,
    ) -> Result<String, QueueError> {
        if delay.is_zero() {
            return self.xadd(destination, body, attributes).await;
        }

        let envelope = DelayedEnvelope {
            id: Uuid::new_v4().to_string(),
            body: body.to_string(),
            attributes: attributes.clone(),
        };
        let member = serde_json::to_string(&envelope)?;
        let due_at_ms = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;

        let mut conn = self.redis.clone();
        let _: () = conn
            .zadd(delayed_key(destination), member, due_at_ms)
            .await?;

        debug!(
            destination = %destination,
            message_id = %envelope.id,
            delay_secs = %delay.as_secs(),
            "Message parked for delayed delivery"
        );

        Ok(envelope.id)
    }

    async fn is_healthy(&self, destination: &str) -> bool {
        let mut conn = self.redis.clone();

        let ping: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        if ping.is_err() {
            return false;
        }

        let len: Result<i64, _> = conn.xlen(destination).await;
        match len {
            Ok(_) => true,
            Err(e) => {
                warn!(destination = %destination, error = %e, "Queue health check failed");
                false
            }
        }
    }
}

fn delayed_key(destination: &str) -> String {
    format!("{destination}:delayed")
}

/// Consumer group configuration for one destination.
#[derive(Debug, Clone)]
pub struct ConsumerGroupConfig {
    /// The stream to consume.
    pub destination: String,

    /// Consumer group name; all instances in the group share the stream.
    pub group: String,

    /// Unique consumer id within the group.
    pub consumer_id: String,

    /// Idle time after which another consumer may claim an unacked message.
    pub claim_idle: Duration,
}

impl ConsumerGroupConfig {
    pub fn new(destination: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            group: group.into(),
            consumer_id: format!("consumer-{}", Uuid::new_v4()),
            claim_idle: Duration::from_secs(30),
        }
    }

    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    pub fn with_claim_idle(mut self, idle: Duration) -> Self {
        self.claim_idle = idle;
        self
    }
}

/// Redis Streams implementation of [`QueueReceiver`].
#[derive(Clone)]
pub struct RedisStreamConsumer {
    redis: ConnectionManager,
    config: ConsumerGroupConfig,
}

impl RedisStreamConsumer {
    pub fn new(redis: ConnectionManager, config: ConsumerGroupConfig) -> Self {
        Self { redis, config }
    }

    /// Ensure the consumer group exists, creating the stream if needed.
    pub async fn ensure_group(&self) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.destination)
            .arg(&self.config.group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    destination = %self.config.destination,
                    group = %self.config.group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(QueueError::Redis(e)),
        }
    }

    /// Move due delayed messages from the sorted set into the stream.
    ///
    /// Two consumers promoting concurrently may both XADD the same member;
    /// that only produces a duplicate delivery, which the at-least-once
    /// contract already requires consumers to tolerate.
    async fn promote_due(&self) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let key = delayed_key(&self.config.destination);
        let now_ms = chrono::Utc::now().timestamp_millis();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(now_ms)
            .arg("LIMIT")
            .arg(0)
            .arg(100)
            .query_async(&mut conn)
            .await?;

        for member in due {
            let envelope: DelayedEnvelope = match serde_json::from_str(&member) {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed delayed entry");
                    let _: i64 = conn.zrem(&key, &member).await?;
                    continue;
                }
            };

            let mut cmd = redis::cmd("XADD");
            cmd.arg(&self.config.destination)
                .arg("*")
                .arg(BODY_FIELD)
                .arg(&envelope.body);
            for (k, v) in &envelope.attributes {
                cmd.arg(format!("{ATTR_PREFIX}{k}")).arg(v);
            }
            let _: String = cmd.query_async(&mut conn).await?;
            let _: i64 = conn.zrem(&key, &member).await?;

            debug!(message_id = %envelope.id, "Promoted delayed message");
        }

        Ok(())
    }

    /// Claim messages another consumer received but never acknowledged.
    async fn claim_abandoned(&self, max: usize) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut conn = self.redis.clone();
        let idle_ms = self.config.claim_idle.as_millis() as u64;

        // XAUTOCLAIM returns [next-start-id, [[id, [field, value, ...]], ...], [deleted-ids]]
        let result: redis::Value = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.destination)
            .arg(&self.config.group)
            .arg(&self.config.consumer_id)
            .arg(idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(max)
            .query_async(&mut conn)
            .await
            .unwrap_or(redis::Value::Nil);

        let mut claimed = Vec::new();
        if let redis::Value::Array(arr) = result {
            if arr.len() >= 2 {
                if let redis::Value::Array(entries) = &arr[1] {
                    for entry in entries {
                        if let Some(msg) = parse_claimed_entry(entry) {
                            claimed.push(msg);
                        }
                    }
                }
            }
        }

        if !claimed.is_empty() {
            info!(
                count = claimed.len(),
                consumer = %self.config.consumer_id,
                "Claimed abandoned messages"
            );
        }

        Ok(claimed)
    }
}

#[async_trait]
impl QueueReceiver for RedisStreamConsumer {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        self.promote_due().await?;

        let mut batch = self.claim_abandoned(max_messages).await?;
        if batch.len() >= max_messages {
            return Ok(batch);
        }

        let mut conn = self.redis.clone();
        let mut opts = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer_id)
            .count(max_messages - batch.len());
        // BLOCK 0 would wait forever; skip blocking for zero waits
        if !wait.is_zero() {
            opts = opts.block(wait.as_millis() as usize);
        }

        let result: Result<StreamReadReply, _> = conn
            .xread_options(&[&self.config.destination], &[">"], &opts)
            .await;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                let err_str = e.to_string();
                // BLOCK timeout just means no messages arrived
                if err_str.to_lowercase().contains("timed out") {
                    return Ok(batch);
                }
                if err_str.contains("NOGROUP") {
                    warn!("Consumer group missing, recreating");
                    self.ensure_group().await?;
                    return Ok(batch);
                }
                return Err(QueueError::Redis(e));
            }
        };

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                if let Some(msg) = parse_field_map(&entry.id, &entry.map, 1) {
                    batch.push(msg);
                }
            }
        }

        Ok(batch)
    }

    async fn ack(&self, transport_id: &str) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();

        let _: i64 = conn
            .xack(
                &self.config.destination,
                &self.config.group,
                &[transport_id],
            )
            .await?;

        debug!(transport_id = %transport_id, "Acknowledged message");
        Ok(())
    }
}

/// Parse a `[id, [field, value, ...]]` entry returned by XAUTOCLAIM.
fn parse_claimed_entry(entry: &redis::Value) -> Option<ReceivedMessage> {
    let redis::Value::Array(parts) = entry else {
        return None;
    };
    if parts.len() < 2 {
        return None;
    }

    let id = value_to_string(&parts[0])?;
    let redis::Value::Array(fields) = &parts[1] else {
        return None;
    };

    let mut map = HashMap::new();
    for pair in fields.chunks(2) {
        if pair.len() == 2 {
            if let Some(k) = value_to_string(&pair[0]) {
                map.insert(k, pair[1].clone());
            }
        }
    }

    // Claimed entries are by definition redeliveries
    parse_field_map(&id, &map, 2)
}

/// Build a ReceivedMessage from a stream entry's field map.
fn parse_field_map(
    id: &str,
    map: &HashMap<String, redis::Value>,
    delivery_count: u32,
) -> Option<ReceivedMessage> {
    let body = value_to_string(map.get(BODY_FIELD)?)?;

    let mut attributes = Attributes::new();
    for (key, value) in map {
        if let Some(attr_key) = key.strip_prefix(ATTR_PREFIX) {
            if let Some(v) = value_to_string(value) {
                attributes.insert(attr_key.to_string(), v);
            }
        }
    }

    Some(ReceivedMessage {
        transport_id: id.to_string(),
        body,
        attributes,
        delivery_count,
    })
}

fn value_to_string(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        redis::Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_map() {
        let mut map = HashMap::new();
        map.insert(
            BODY_FIELD.to_string(),
            redis::Value::BulkString(b"{\"k\":1}".to_vec()),
        );
        map.insert(
            "attr:eventType".to_string(),
            redis::Value::BulkString(b"EMAIL_REQUESTED".to_vec()),
        );
        map.insert(
            "unrelated".to_string(),
            redis::Value::BulkString(b"ignored".to_vec()),
        );

        let msg = parse_field_map("123-0", &map, 1).unwrap();
        assert_eq!(msg.transport_id, "123-0");
        assert_eq!(msg.body, "{\"k\":1}");
        assert_eq!(
            msg.attributes.get("eventType").map(String::as_str),
            Some("EMAIL_REQUESTED")
        );
        assert!(!msg.attributes.contains_key("unrelated"));
    }

    #[test]
    fn test_parse_field_map_missing_body() {
        let map = HashMap::new();
        assert!(parse_field_map("123-0", &map, 1).is_none());
    }

    #[test]
    fn test_parse_claimed_entry() {
        let entry = redis::Value::Array(vec![
            redis::Value::BulkString(b"42-0".to_vec()),
            redis::Value::Array(vec![
                redis::Value::BulkString(BODY_FIELD.as_bytes().to_vec()),
                redis::Value::BulkString(b"payload".to_vec()),
            ]),
        ]);

        let msg = parse_claimed_entry(&entry).unwrap();
        assert_eq!(msg.transport_id, "42-0");
        assert_eq!(msg.body, "payload");
        assert!(msg.is_redelivery());
    }

    #[test]
    fn test_consumer_group_config_defaults() {
        let config = ConsumerGroupConfig::new("notification:events", "notification_workers");
        assert_eq!(config.destination, "notification:events");
        assert_eq!(config.group, "notification_workers");
        assert!(config.consumer_id.starts_with("consumer-"));
        assert_eq!(config.claim_idle, Duration::from_secs(30));
    }
}
