//! Messages carried by the bus.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::telemetry::TraceMessage;

/// Anything routable by the bus. The key is only used to pick a shard.
pub trait PartitionedMessage: Send + 'static {
    fn partition_key(&self) -> i64;
}

/// Message type flowing through the analytics engine.
///
/// Handlers match on the variant instead of downcasting, so adding a variant
/// forces every handler to decide what to do with it.
#[derive(Clone, Debug)]
pub enum AnalyticsMessage {
    /// One request/response pair together with its API event.
    Trace(Arc<TraceMessage>),
    /// Handler-defined payload re-published to a secondary topic.
    Custom(CustomMessage),
}

impl AnalyticsMessage {
    pub fn trace(message: TraceMessage) -> Self {
        Self::Trace(Arc::new(message))
    }

    pub fn custom<T: Any + Send + Sync>(partition_key: i64, kind: impl Into<String>, payload: T) -> Self {
        Self::Custom(CustomMessage {
            partition_key,
            kind: kind.into(),
            payload: Arc::new(payload),
        })
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &str {
        match self {
            Self::Trace(_) => "trace",
            Self::Custom(custom) => &custom.kind,
        }
    }
}

impl PartitionedMessage for AnalyticsMessage {
    fn partition_key(&self) -> i64 {
        match self {
            Self::Trace(trace) => trace.partition_key(),
            Self::Custom(custom) => custom.partition_key,
        }
    }
}

/// Opaque payload with an explicit partition key.
#[derive(Clone)]
pub struct CustomMessage {
    pub partition_key: i64,
    pub kind: String,
    pub payload: Arc<dyn Any + Send + Sync>,
}

impl CustomMessage {
    /// Borrow the payload as `T` if that is what it holds.
    pub fn payload_as<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for CustomMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMessage")
            .field("partition_key", &self.partition_key)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
