//! Trace handler that diffs traffic against known specs.
//!
//! Runs after the annotator on the *trace* topic. For each trace it asks
//! the speculator for provided and reconstructed diffs, stamps the outcome
//! on the API event, persists it and feeds real diffs to the aggregator.
//! Diffs of an event that could not be persisted are dropped.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::accessor::{spec_key, BackendAccessor, DiffSource, SpecDiff, SpeculatorAccessor};
use crate::bus::AnalyticsMessage;
use crate::differ::aggregator::DiffAggregator;
use crate::differ::types::{DiffType, SpecType};
use crate::differ::MODULE_NAME;
use crate::engine::{AnalyzerHandler, Annotations, HandlerError, ProcessContext};
use crate::telemetry::{ApiEvent, TraceMessage};

pub const SPEC_DIFF_PRIORITY: i32 = 20;

pub struct SpecDiffHandler {
    accessor: Arc<dyn BackendAccessor>,
    aggregator: Arc<DiffAggregator>,
}

impl SpecDiffHandler {
    pub fn new(accessor: Arc<dyn BackendAccessor>, aggregator: Arc<DiffAggregator>) -> Self {
        Self { accessor, aggregator }
    }

    async fn handle_trace(&self, trace: &TraceMessage) {
        let speculator = self.accessor.speculator();
        let key = spec_key(&trace.event.host_spec_name, trace.event.destination_port);
        let has_provided = speculator.has_provided_spec(&key);
        let has_approved = speculator.has_approved_spec(&key);
        if !has_provided && !has_approved {
            debug!(spec_key = %key, "No spec to diff against");
            return;
        }

        let Some(provided) = diff_if(speculator.as_ref(), has_provided, trace, DiffSource::Provided) else {
            return;
        };
        let Some(reconstructed) = diff_if(speculator.as_ref(), has_approved, trace, DiffSource::Reconstructed) else {
            return;
        };

        let event = stamp_event(&trace.event, &provided, &reconstructed);
        if let Err(e) = self.accessor.update_api_event(&event).await {
            error!(event_id = event.id, api_id = event.api_info_id, error = %e, "Failed to update API event");
            return;
        }

        for (diff, spec_type) in [(provided, SpecType::Provided), (reconstructed, SpecType::Reconstructed)] {
            if diff.diff_type.is_diff() {
                self.aggregator
                    .record_diff(&event, &diff.new_spec, &diff.old_spec, diff.diff_type, spec_type)
                    .await;
            }
        }
    }
}

/// Diff against `source` when the spec exists, a no-diff result when it
/// does not. `None` when diffing failed.
fn diff_if(
    speculator: &dyn SpeculatorAccessor,
    exists: bool,
    trace: &TraceMessage,
    source: DiffSource,
) -> Option<SpecDiff> {
    if !exists {
        return Some(SpecDiff::default());
    }
    match speculator.diff_telemetry(&trace.telemetry, source) {
        Ok(diff) => Some(diff),
        Err(e) => {
            warn!(event_id = trace.event.id, ?source, error = %e, "Failed to diff telemetry");
            None
        }
    }
}

fn stamp_event(event: &ApiEvent, provided: &SpecDiff, reconstructed: &SpecDiff) -> ApiEvent {
    let mut event = event.clone();
    event.spec_diff_type = DiffType::NoDiff
        .highest(provided.diff_type)
        .highest(reconstructed.diff_type);
    event.has_provided_spec_diff = provided.diff_type.is_diff();
    event.has_reconstructed_spec_diff = reconstructed.diff_type.is_diff();
    event.has_spec_diff = event.has_provided_spec_diff || event.has_reconstructed_spec_diff;
    event.old_provided_spec = provided.old_spec.clone();
    event.new_provided_spec = provided.new_spec.clone();
    event.old_reconstructed_spec = reconstructed.old_spec.clone();
    event.new_reconstructed_spec = reconstructed.new_spec.clone();
    event
}

#[async_trait]
impl AnalyzerHandler for SpecDiffHandler {
    fn name(&self) -> &str {
        MODULE_NAME
    }

    fn priority(&self) -> i32 {
        SPEC_DIFF_PRIORITY
    }

    async fn process(
        &self,
        _ctx: ProcessContext<'_>,
        message: &AnalyticsMessage,
        annotations: Annotations,
    ) -> Result<Annotations, HandlerError> {
        if let AnalyticsMessage::Trace(trace) = message {
            self.handle_trace(trace).await;
        }
        Ok(annotations)
    }
}
