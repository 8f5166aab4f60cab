//! Analyzer dispatch engine.
//!
//! # Data Flow
//! ```text
//! MessageBus shard queue
//!     → dispatcher.rs (one consumer task per topic/shard)
//!     → registry.rs (priority-ordered chain for the topic)
//!     → handler 0 → handler 1 → ... (annotations threaded through)
//!     → handlers may publish to other topics via Publisher
//! ```

pub mod dispatcher;
pub mod handler;
pub mod registry;

pub use dispatcher::{AnalyticsEngine, Publisher};
pub use handler::{
    find_annotated_trace, AnalyzerHandler, Annotation, Annotations, HandlerError, ProcessContext,
    ANNOTATION_CAPACITY,
};
pub use registry::{HandlerChain, HandlerRegistry};
