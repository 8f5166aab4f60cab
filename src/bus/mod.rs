//! Partitioned in-memory message bus.
//!
//! # Data Flow
//! ```text
//! producer
//!     → publish_by_partition_key(topic, msg)
//!     → shard = |partition_key| mod num_partitions(topic)
//!     → publish_to_shard(topic, shard, msg)   (blocks while the queue is full)
//!     → bounded FIFO (capacity 1000)
//!     → ShardReader (exactly one consumer loop per shard)
//! ```
//!
//! # Design Decisions
//! - One bounded queue per `(topic, shard)`; producers suspend when it is full
//! - Messages sharing a partition key land on the same shard, so they are
//!   consumed in publish order
//! - No persistence: whatever sits in a queue is gone when the process exits
//! - Adding shards changes the modulus, which reshuffles keys

pub mod broker;
pub mod message;

pub use broker::{BusError, MessageBus, ShardReader};
pub use message::{AnalyticsMessage, CustomMessage, PartitionedMessage};

/// Capacity of every shard queue.
pub const SHARD_QUEUE_CAPACITY: usize = 1000;

/// Topic names known at startup.
pub mod topics {
    pub const TRACE: &str = "trace";
    pub const API: &str = "api";
    pub const API_ENDPOINT: &str = "api_endpoint";
    pub const OBJECT: &str = "object";
    pub const ENTITY: &str = "entity";

    /// Every topic the engine initialises at construction, in creation order.
    pub const DEFAULT_TOPICS: [&str; 5] = [TRACE, API, API_ENDPOINT, OBJECT, ENTITY];
}
