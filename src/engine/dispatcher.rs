//! Shard consumer loops and chained handler invocation.
//!
//! # Responsibilities
//! - Start one consumer task per `(topic, shard)`
//! - Run the topic's handler chain for every message, threading annotations
//! - Let handlers re-publish through [`Publisher`]
//!
//! # Design Decisions
//! - A handler error or panic is logged and counted; the rest of the chain
//!   is skipped for that message and the shard moves on
//! - Worker count only grows; shards are never torn down while running
//! - Cycles between topics are the handlers' problem, not the engine's

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bus::topics::DEFAULT_TOPICS;
use crate::bus::{AnalyticsMessage, BusError, MessageBus, ShardReader};
use crate::engine::handler::{AnalyzerHandler, ProcessContext, ANNOTATION_CAPACITY};
use crate::engine::registry::HandlerRegistry;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Publishing handle given to handlers and producers.
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<MessageBus<AnalyticsMessage>>,
}

impl Publisher {
    pub fn new(bus: Arc<MessageBus<AnalyticsMessage>>) -> Self {
        Self { bus }
    }

    /// Route `message` to its partition of `topic`.
    pub async fn publish(&self, topic: &str, message: AnalyticsMessage) -> Result<(), BusError> {
        self.bus.publish_by_partition_key(topic, message).await
    }
}

#[derive(Default)]
struct Topology {
    num_workers: usize,
    topics: Vec<String>,
}

/// Scheduler that drains every shard and runs the registered chains.
pub struct AnalyticsEngine {
    bus: Arc<MessageBus<AnalyticsMessage>>,
    registry: Arc<HandlerRegistry>,
    publisher: Publisher,
    topology: Mutex<Topology>,
    shutdown: Shutdown,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AnalyticsEngine {
    /// Create the engine and start `num_workers` shards for each default topic.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(num_workers: usize, queue_capacity: usize, shutdown: Shutdown) -> Self {
        let bus = Arc::new(MessageBus::with_capacity(queue_capacity));
        let engine = Self {
            publisher: Publisher::new(bus.clone()),
            bus,
            registry: Arc::new(HandlerRegistry::new()),
            topology: Mutex::new(Topology {
                num_workers: num_workers.max(1),
                topics: Vec::new(),
            }),
            shutdown,
            workers: Mutex::new(Vec::new()),
        };

        for topic in DEFAULT_TOPICS {
            engine.init_topic(topic);
        }
        engine
    }

    /// Start `num_workers` shards for `topic`. No-op for a known topic.
    pub fn init_topic(&self, topic: &str) {
        let mut topology = self.topology.lock();
        if topology.topics.iter().any(|t| t == topic) {
            return;
        }
        for shard_id in 0..topology.num_workers {
            self.start_shard(topic, shard_id);
        }
        topology.topics.push(topic.to_string());
        info!(topic, shards = topology.num_workers, "Topic initialised");
    }

    /// Add `count` shards to every known topic. Returns how many were added.
    pub fn add_workers(&self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let mut topology = self.topology.lock();
        let first = topology.num_workers;
        for shard_id in first..first + count {
            for topic in &topology.topics {
                self.start_shard(topic, shard_id);
            }
        }
        topology.num_workers += count;
        info!(added = count, num_workers = topology.num_workers, "Workers added");
        count
    }

    pub fn register_handler(&self, topic: &str, handler: Arc<dyn AnalyzerHandler>) {
        self.registry.register(topic, handler);
    }

    pub async fn publish(&self, topic: &str, message: AnalyticsMessage) -> Result<(), BusError> {
        self.publisher.publish(topic, message).await
    }

    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn bus(&self) -> &Arc<MessageBus<AnalyticsMessage>> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn num_workers(&self) -> usize {
        self.topology.lock().num_workers
    }

    pub fn topics(&self) -> Vec<String> {
        self.topology.lock().topics.clone()
    }

    /// Signal every shard loop to exit and wait for them.
    pub async fn stop(&self) {
        self.shutdown.trigger();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }
    }

    fn start_shard(&self, topic: &str, shard_id: usize) {
        if self.shutdown.is_triggered() {
            return;
        }
        let reader = self.bus.add_subscription_shard(topic, shard_id);
        let worker = tokio::spawn(run_shard(
            reader,
            self.registry.clone(),
            self.publisher.clone(),
            self.shutdown.subscribe(),
        ));
        self.workers.lock().push(worker);
    }
}

async fn run_shard(
    reader: ShardReader<AnalyticsMessage>,
    registry: Arc<HandlerRegistry>,
    publisher: Publisher,
    mut shutdown: broadcast::Receiver<()>,
) {
    debug!(topic = reader.topic(), shard = reader.shard_id(), "Shard loop started");
    loop {
        let message = tokio::select! {
            message = reader.recv() => match message {
                Some(message) => message,
                None => break,
            },
            _ = shutdown.recv() => break,
        };
        dispatch(&reader, &registry, &publisher, message).await;
    }
    debug!(topic = reader.topic(), shard = reader.shard_id(), "Shard loop stopped");
}

async fn dispatch(
    reader: &ShardReader<AnalyticsMessage>,
    registry: &HandlerRegistry,
    publisher: &Publisher,
    message: AnalyticsMessage,
) {
    let topic = reader.topic();
    let Some(chain) = registry.chain(topic) else {
        return;
    };
    if chain.is_empty() {
        return;
    }

    let mut annotations = Vec::with_capacity(ANNOTATION_CAPACITY);
    for handler in chain.iter() {
        let ctx = ProcessContext {
            topic,
            shard_id: reader.shard_id(),
            publisher,
        };
        let outcome = AssertUnwindSafe(handler.process(ctx, &message, annotations))
            .catch_unwind()
            .await;

        annotations = match outcome {
            Ok(Ok(next)) => next,
            Ok(Err(e)) => {
                error!(topic, shard = reader.shard_id(), handler = handler.name(), error = %e, "Handler failed");
                metrics::record_handler_failure(topic, handler.name());
                return;
            }
            Err(_) => {
                error!(topic, shard = reader.shard_id(), handler = handler.name(), kind = message.kind(), "Handler panicked");
                metrics::record_handler_failure(topic, handler.name());
                return;
            }
        };
    }
    metrics::record_message_processed(topic);
}
