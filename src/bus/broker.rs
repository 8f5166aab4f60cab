//! Topic/shard broker.
//!
//! # Responsibilities
//! - Own one bounded queue per `(topic, shard)`
//! - Hand out the single consumer endpoint of each queue
//! - Route published messages by partition key
//!
//! # Design Decisions
//! - Topic map is a `DashMap` so publishers never contend with each other;
//!   shard creation only touches the map entry of its own topic
//! - A queue's sender is cloned out of the map before awaiting, so a blocked
//!   publisher never holds a map guard

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::debug;

use crate::bus::message::PartitionedMessage;
use crate::bus::SHARD_QUEUE_CAPACITY;
use crate::observability::metrics;

/// Errors returned to publishers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("no topic '{0}' exists")]
    UnknownTopic(String),

    #[error("no partition '{shard_id}' exists for topic '{topic}'")]
    UnknownShard { topic: String, shard_id: usize },

    #[error("partition '{shard_id}' of topic '{topic}' is closed")]
    Closed { topic: String, shard_id: usize },
}

impl BusError {
    fn reason(&self) -> &'static str {
        match self {
            BusError::UnknownTopic(_) => "unknown_topic",
            BusError::UnknownShard { .. } => "unknown_shard",
            BusError::Closed { .. } => "closed",
        }
    }
}

/// Consumer side of one shard queue.
///
/// Clones share the same queue; the bus hands the same reader back when a
/// shard is subscribed twice.
pub struct ShardReader<M> {
    topic: Arc<str>,
    shard_id: usize,
    receiver: Arc<AsyncMutex<mpsc::Receiver<M>>>,
}

impl<M> Clone for ShardReader<M> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            shard_id: self.shard_id,
            receiver: self.receiver.clone(),
        }
    }
}

impl<M> ShardReader<M> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn shard_id(&self) -> usize {
        self.shard_id
    }

    /// Wait for the next message. `None` once every sender is gone.
    pub async fn recv(&self) -> Option<M> {
        self.receiver.lock().await.recv().await
    }

    /// Take the next message if one is queued and nobody else is reading.
    pub fn try_recv(&self) -> Option<M> {
        self.receiver.try_lock().ok()?.try_recv().ok()
    }

    /// True when both readers drain the same queue.
    pub fn same_queue(&self, other: &ShardReader<M>) -> bool {
        Arc::ptr_eq(&self.receiver, &other.receiver)
    }
}

struct Shard<M> {
    sender: mpsc::Sender<M>,
    reader: ShardReader<M>,
}

/// In-process partitioned pub/sub broker.
pub struct MessageBus<M> {
    topics: DashMap<String, BTreeMap<usize, Shard<M>>>,
    capacity: usize,
    published: AtomicU64,
}

impl<M: PartitionedMessage> MessageBus<M> {
    /// Create a bus whose shard queues hold [`SHARD_QUEUE_CAPACITY`] messages.
    pub fn new() -> Self {
        Self::with_capacity(SHARD_QUEUE_CAPACITY)
    }

    /// Create a bus with a custom per-shard capacity (at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
            published: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Create the queue for `(topic, shard_id)` and return its reader.
    ///
    /// Subscribing an existing pair returns the reader created the first
    /// time; no second queue is ever made.
    pub fn add_subscription_shard(&self, topic: &str, shard_id: usize) -> ShardReader<M> {
        let mut shards = self.topics.entry(topic.to_string()).or_default();
        if let Some(existing) = shards.get(&shard_id) {
            return existing.reader.clone();
        }

        let (sender, receiver) = mpsc::channel(self.capacity);
        let reader = ShardReader {
            topic: Arc::from(topic),
            shard_id,
            receiver: Arc::new(AsyncMutex::new(receiver)),
        };
        shards.insert(
            shard_id,
            Shard {
                sender,
                reader: reader.clone(),
            },
        );

        debug!(topic, shard_id, partitions = shards.len(), "Subscription shard created");
        reader
    }

    /// Number of shards currently serving `topic` (0 when unknown).
    pub fn num_partitions(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|shards| shards.len()).unwrap_or(0)
    }

    /// Names of every topic with at least one shard.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Total messages accepted by any shard queue.
    pub fn published_total(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Enqueue on a specific shard, waiting while its queue is full.
    pub async fn publish_to_shard(&self, topic: &str, shard_id: usize, message: M) -> Result<(), BusError> {
        let result = self.enqueue(topic, shard_id, message).await;
        if let Err(e) = &result {
            metrics::record_publish_error(topic, e.reason());
        }
        result
    }

    /// Enqueue on the shard owning the message's partition key.
    pub async fn publish_by_partition_key(&self, topic: &str, message: M) -> Result<(), BusError> {
        let partitions = self.num_partitions(topic);
        if partitions == 0 {
            let err = BusError::UnknownTopic(topic.to_string());
            metrics::record_publish_error(topic, err.reason());
            return Err(err);
        }

        let shard_id = shard_for_key(message.partition_key(), partitions);
        self.publish_to_shard(topic, shard_id, message).await
    }

    async fn enqueue(&self, topic: &str, shard_id: usize, message: M) -> Result<(), BusError> {
        let sender = {
            let shards = self
                .topics
                .get(topic)
                .ok_or_else(|| BusError::UnknownTopic(topic.to_string()))?;
            shards
                .get(&shard_id)
                .map(|shard| shard.sender.clone())
                .ok_or_else(|| BusError::UnknownShard {
                    topic: topic.to_string(),
                    shard_id,
                })?
        };

        sender.send(message).await.map_err(|_| BusError::Closed {
            topic: topic.to_string(),
            shard_id,
        })?;

        self.published.fetch_add(1, Ordering::Relaxed);
        metrics::record_published(topic);
        Ok(())
    }
}

impl<M: PartitionedMessage> Default for MessageBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shard owning `key` when the topic has `partitions` shards.
pub fn shard_for_key(key: i64, partitions: usize) -> usize {
    (key.unsigned_abs() % partitions as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Debug, Clone, PartialEq)]
    struct TestMsg {
        key: i64,
        seq: u32,
    }

    impl PartitionedMessage for TestMsg {
        fn partition_key(&self) -> i64 {
            self.key
        }
    }

    #[tokio::test]
    async fn test_publish_consume() {
        let bus = MessageBus::new();
        let reader = bus.add_subscription_shard("x", 0);

        bus.publish_by_partition_key("x", TestMsg { key: 0, seq: 1 }).await.unwrap();

        let received = timeout(Duration::from_millis(100), reader.recv())
            .await
            .expect("timeout")
            .expect("message");
        assert_eq!(received, TestMsg { key: 0, seq: 1 });
        assert_eq!(bus.published_total(), 1);
    }

    #[tokio::test]
    async fn test_subscription_is_idempotent() {
        let bus: MessageBus<TestMsg> = MessageBus::new();
        let first = bus.add_subscription_shard("x", 0);
        let second = bus.add_subscription_shard("x", 0);

        assert!(first.same_queue(&second));
        assert_eq!(bus.num_partitions("x"), 1);

        let other = bus.add_subscription_shard("x", 1);
        assert!(!first.same_queue(&other));
        assert_eq!(bus.num_partitions("x"), 2);
    }

    #[tokio::test]
    async fn test_unknown_topic_and_shard() {
        let bus = MessageBus::new();
        let _reader = bus.add_subscription_shard("x", 0);

        let err = bus
            .publish_by_partition_key("nope", TestMsg { key: 1, seq: 0 })
            .await
            .unwrap_err();
        assert_eq!(err, BusError::UnknownTopic("nope".into()));

        let err = bus.publish_to_shard("x", 3, TestMsg { key: 1, seq: 0 }).await.unwrap_err();
        assert!(matches!(err, BusError::UnknownShard { shard_id: 3, .. }));
        assert_eq!(bus.num_partitions("nope"), 0);
    }

    #[tokio::test]
    async fn test_same_key_keeps_order() {
        let bus = MessageBus::new();
        let readers: Vec<_> = (0..4).map(|shard| bus.add_subscription_shard("t", shard)).collect();

        for seq in 0..50 {
            bus.publish_by_partition_key("t", TestMsg { key: 13, seq }).await.unwrap();
        }

        let owner = &readers[shard_for_key(13, 4)];
        for expected in 0..50 {
            let msg = owner.try_recv().expect("message on owning shard");
            assert_eq!(msg.seq, expected);
        }
        for (shard, reader) in readers.iter().enumerate() {
            assert!(reader.try_recv().is_none(), "shard {shard} should be drained");
        }
    }

    #[test]
    fn test_negative_keys_map_to_valid_shards() {
        assert_eq!(shard_for_key(-5, 3), 2);
        assert_eq!(shard_for_key(5, 3), 2);
        assert!(shard_for_key(i64::MIN, 7) < 7);
    }

    #[tokio::test]
    async fn test_full_queue_blocks_publisher() {
        let bus = Arc::new(MessageBus::with_capacity(1));
        let reader = bus.add_subscription_shard("x", 0);

        bus.publish_to_shard("x", 0, TestMsg { key: 0, seq: 0 }).await.unwrap();

        let blocked = timeout(
            Duration::from_millis(50),
            bus.publish_to_shard("x", 0, TestMsg { key: 0, seq: 1 }),
        )
        .await;
        assert!(blocked.is_err(), "publisher should wait for room");

        let producer = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.publish_to_shard("x", 0, TestMsg { key: 0, seq: 2 }).await })
        };
        assert_eq!(reader.recv().await.map(|m| m.seq), Some(0));
        producer.await.unwrap().unwrap();
        assert_eq!(reader.recv().await.map(|m| m.seq), Some(2));
    }
}
