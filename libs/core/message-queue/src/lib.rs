//! Message Queue Abstraction
//!
//! An at-least-once message transport decoupling producers from consumers.
//!
//! ## Guarantees
//!
//! - **At-least-once delivery**: a message may be delivered more than once;
//!   consumers must be idempotent.
//! - **No cross-partition ordering**: ordering beyond what attributes encode
//!   is not guaranteed.
//! - **Visibility-timeout redelivery**: messages received but never
//!   acknowledged become claimable again after an idle threshold.
//!
//! ## Transports
//!
//! - [`RedisStreamQueue`] / [`RedisStreamConsumer`]: Redis Streams with
//!   consumer groups (XADD / XREADGROUP / XACK / XAUTOCLAIM). Delayed sends
//!   go through a per-destination sorted set promoted when due.
//! - [`InMemoryQueue`]: process-local transport for tests and local
//!   development.
//!
//! ## Example
//!
//! ```ignore
//! use message_queue::{MessageQueue, RedisStreamQueue};
//!
//! let queue = RedisStreamQueue::new(redis);
//! let id = queue.send("notification:events", &body, &attributes).await?;
//! ```

mod error;
mod memory;
mod queue;
mod redis_streams;

pub use error::QueueError;
pub use memory::{InMemoryQueue, InMemoryReceiver};
pub use queue::{Attributes, MessageQueue, QueueReceiver, ReceivedMessage};
pub use redis_streams::{ConsumerGroupConfig, RedisStreamConsumer, RedisStreamQueue};
