//! Analyzer handler contract.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::bus::AnalyticsMessage;
use crate::engine::dispatcher::Publisher;
use crate::telemetry::AnnotatedTrace;

/// Initial capacity of the annotation list built for each message.
pub const ANNOTATION_CAPACITY: usize = 100;

/// Value threaded through a handler chain.
#[derive(Clone)]
pub enum Annotation {
    /// Output of the trace annotator.
    Trace(Arc<AnnotatedTrace>),
    /// Anything a downstream analyzer wants to hand to the next one.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Annotation {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self::Opaque(Arc::new(value))
    }

    pub fn as_trace(&self) -> Option<&AnnotatedTrace> {
        match self {
            Self::Trace(trace) => Some(trace),
            Self::Opaque(_) => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Opaque(value) => value.downcast_ref::<T>(),
            Self::Trace(_) => None,
        }
    }
}

impl fmt::Debug for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace(trace) => f.debug_tuple("Trace").field(&trace.api_endpoint_name).finish(),
            Self::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

/// Ordered annotations accumulated for one message.
pub type Annotations = Vec<Annotation>;

/// First annotated trace in the chain output, if any.
pub fn find_annotated_trace(annotations: &[Annotation]) -> Option<&AnnotatedTrace> {
    annotations.iter().find_map(Annotation::as_trace)
}

/// Error raised by a handler. The rest of the chain is skipped for the
/// message; the shard keeps running.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{handler}: {message}")]
    Failed { handler: String, message: String },

    #[error("{handler}: publish failed: {source}")]
    Publish {
        handler: String,
        #[source]
        source: crate::bus::BusError,
    },
}

impl HandlerError {
    pub fn failed(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

/// Where a handler invocation runs.
pub struct ProcessContext<'a> {
    pub topic: &'a str,
    pub shard_id: usize,
    pub publisher: &'a Publisher,
}

/// An analyzer plugged into a topic's chain.
///
/// Handlers run serially per shard in ascending priority; each receives the
/// annotations returned by the previous one.
#[async_trait]
pub trait AnalyzerHandler: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32;

    async fn process(
        &self,
        ctx: ProcessContext<'_>,
        message: &AnalyticsMessage,
        annotations: Annotations,
    ) -> Result<Annotations, HandlerError>;
}
