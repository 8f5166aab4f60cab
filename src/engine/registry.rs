//! Per-topic handler chains.
//!
//! # Design Decisions
//! - Chains are re-sorted on every registration (stable sort, so equal
//!   priorities keep insertion order)
//! - Readers get an `Arc` snapshot of the chain and release the lock before
//!   running it; registration after startup is therefore safe

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::engine::handler::AnalyzerHandler;

pub type HandlerChain = Arc<Vec<Arc<dyn AnalyzerHandler>>>;

#[derive(Default)]
pub struct HandlerRegistry {
    chains: RwLock<HashMap<String, HandlerChain>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the chain of `topic` and restore priority order.
    pub fn register(&self, topic: &str, handler: Arc<dyn AnalyzerHandler>) {
        let mut chains = self.chains.write();
        let mut chain: Vec<_> = chains
            .get(topic)
            .map(|existing| existing.iter().cloned().collect())
            .unwrap_or_default();

        debug!(topic, handler = handler.name(), priority = handler.priority(), "Registering handler");
        chain.push(handler);
        chain.sort_by_key(|h| h.priority());

        chains.insert(topic.to_string(), Arc::new(chain));
    }

    /// Snapshot of the chain for `topic`.
    pub fn chain(&self, topic: &str) -> Option<HandlerChain> {
        self.chains.read().get(topic).cloned()
    }

    /// Handler names of `topic` in invocation order.
    pub fn handler_names(&self, topic: &str) -> Vec<String> {
        self.chain(topic)
            .map(|chain| chain.iter().map(|h| h.name().to_string()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::AnalyticsMessage;
    use crate::engine::handler::{Annotations, HandlerError, ProcessContext};
    use async_trait::async_trait;

    struct Named(&'static str, i32);

    #[async_trait]
    impl AnalyzerHandler for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn priority(&self) -> i32 {
            self.1
        }

        async fn process(
            &self,
            _ctx: ProcessContext<'_>,
            _message: &AnalyticsMessage,
            annotations: Annotations,
        ) -> Result<Annotations, HandlerError> {
            Ok(annotations)
        }
    }

    #[test]
    fn test_chain_sorted_by_priority() {
        let registry = HandlerRegistry::new();
        registry.register("entity", Arc::new(Named("p3", 3)));
        registry.register("entity", Arc::new(Named("p2", 2)));
        registry.register("entity", Arc::new(Named("p0", 0)));
        registry.register("entity", Arc::new(Named("p1", 1)));

        assert_eq!(registry.handler_names("entity"), vec!["p0", "p1", "p2", "p3"]);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let registry = HandlerRegistry::new();
        registry.register("trace", Arc::new(Named("first", 5)));
        registry.register("trace", Arc::new(Named("early", 1)));
        registry.register("trace", Arc::new(Named("second", 5)));

        assert_eq!(registry.handler_names("trace"), vec!["early", "first", "second"]);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_registration() {
        let registry = HandlerRegistry::new();
        registry.register("api", Arc::new(Named("a", 1)));
        let snapshot = registry.chain("api").unwrap();
        registry.register("api", Arc::new(Named("b", 0)));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.chain("api").unwrap().len(), 2);
        assert!(registry.chain("object").is_none());
    }
}
