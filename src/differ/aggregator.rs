//! Spec-diff aggregation between notification ticks.
//!
//! # Responsibilities
//! - Deduplicate diffs per API by content hash
//! - Bound memory with a unique-diff threshold
//! - Turn the pending set into one notification per API on flush
//!
//! # Design Decisions
//! - The accessor is never called while the state lock is held: identities
//!   are fetched before taking the write lock on ingress and after
//!   releasing the read lock on flush
//! - Flush always clears the state, even when delivery fails; pending diffs
//!   are dropped rather than retried

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::accessor::{ApiInfo, BackendAccessor};
use crate::differ::types::{
    ApiDiffs, ApiInfoWithType, Diff, DiffHash, DiffType, Notification, SpecDiffsNotification, SpecType,
};
use crate::observability::metrics;
use crate::telemetry::ApiEvent;

/// What `record_diff` did with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    SkippedNoDiff,
    DroppedThreshold,
    ApiInfoUnavailable,
    New,
    Duplicate,
}

impl RecordOutcome {
    fn as_label(self) -> &'static str {
        match self {
            RecordOutcome::SkippedNoDiff => "skipped",
            RecordOutcome::DroppedThreshold => "dropped",
            RecordOutcome::ApiInfoUnavailable => "api_info_unavailable",
            RecordOutcome::New => "new",
            RecordOutcome::Duplicate => "duplicate",
        }
    }
}

/// Result of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// APIs with pending diffs when the flush started.
    pub pending_apis: usize,
    /// Notifications accepted by the accessor.
    pub notified: usize,
    /// Unique diffs discarded by the clear.
    pub cleared_diffs: usize,
    /// A `notify` failure cut the flush short.
    pub aborted: bool,
}

#[derive(Default)]
struct State {
    api_to_diffs: HashMap<u32, HashMap<DiffHash, Diff>>,
    total_unique_diffs: usize,
}

pub struct DiffAggregator {
    module_name: String,
    state: RwLock<State>,
    accessor: Arc<dyn BackendAccessor>,
    threshold: usize,
    hash_includes_spec_type: bool,
}

impl DiffAggregator {
    pub fn new(
        module_name: impl Into<String>,
        accessor: Arc<dyn BackendAccessor>,
        threshold: usize,
        hash_includes_spec_type: bool,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            state: RwLock::new(State::default()),
            accessor,
            threshold,
            hash_includes_spec_type,
        }
    }

    pub fn total_unique_diffs(&self) -> usize {
        self.state.read().total_unique_diffs
    }

    /// Pending diffs per API, each list ordered by `last_seen`.
    pub fn snapshot(&self) -> HashMap<u32, Vec<Diff>> {
        self.state
            .read()
            .api_to_diffs
            .iter()
            .map(|(api_id, diffs)| (*api_id, sorted(diffs.values().cloned().collect())))
            .collect()
    }

    /// Record one diff seen on `event`.
    ///
    /// Repeated content for the same API only refreshes `last_seen`.
    pub async fn record_diff(
        &self,
        event: &ApiEvent,
        new_spec: &str,
        old_spec: &str,
        diff_type: DiffType,
        spec_type: SpecType,
    ) -> RecordOutcome {
        let outcome = self.try_record(event, new_spec, old_spec, diff_type, spec_type).await;
        metrics::record_diff_outcome(outcome.as_label());
        outcome
    }

    async fn try_record(
        &self,
        event: &ApiEvent,
        new_spec: &str,
        old_spec: &str,
        diff_type: DiffType,
        spec_type: SpecType,
    ) -> RecordOutcome {
        if !diff_type.is_diff() {
            return RecordOutcome::SkippedNoDiff;
        }

        let total = self.total_unique_diffs();
        if total > self.threshold {
            warn!(
                api_id = event.api_info_id,
                total_unique_diffs = total,
                threshold = self.threshold,
                "Too many pending diffs, dropping diff until next notification"
            );
            return RecordOutcome::DroppedThreshold;
        }

        // The spec type only joins the hash when configured to, so by default
        // a provided and a reconstructed diff with equal content collapse.
        let hash = DiffHash::compute(new_spec, old_spec, self.hash_includes_spec_type.then_some(spec_type));

        let api_info = match self.accessor.get_api_info(event.api_info_id).await {
            Ok(info) => info,
            Err(e) => {
                error!(api_id = event.api_info_id, error = %e, "Failed to get API info, dropping diff");
                return RecordOutcome::ApiInfoUnavailable;
            }
        };

        let diff = Diff {
            diff_type,
            last_seen: event.time,
            method: event.method.clone(),
            path: event.path.clone(),
            new_spec: new_spec.to_string(),
            old_spec: old_spec.to_string(),
            spec_type,
            spec_timestamp: spec_timestamp(&api_info, spec_type),
        };

        let mut state = self.state.write();
        let is_new = state
            .api_to_diffs
            .entry(event.api_info_id)
            .or_default()
            .insert(hash, diff)
            .is_none();
        if is_new {
            state.total_unique_diffs += 1;
        }
        metrics::set_diffs_pending(state.total_unique_diffs);
        debug!(api_id = event.api_info_id, hash = %hash, is_new, "Diff recorded");

        if is_new {
            RecordOutcome::New
        } else {
            RecordOutcome::Duplicate
        }
    }

    /// Send every pending diff, then clear the state.
    pub async fn flush(&self) -> FlushReport {
        let pending: Vec<(u32, Vec<Diff>)> = {
            let state = self.state.read();
            if state.total_unique_diffs == 0 {
                return FlushReport::default();
            }
            state
                .api_to_diffs
                .iter()
                .map(|(api_id, diffs)| (*api_id, sorted(diffs.values().cloned().collect())))
                .collect()
        };

        let mut report = FlushReport {
            pending_apis: pending.len(),
            ..Default::default()
        };

        let mut notifications = Vec::with_capacity(pending.len());
        for (api_id, diffs) in pending {
            match self.accessor.get_api_info(api_id).await {
                Ok(info) => notifications.push(Notification::SpecDiffsNotification(SpecDiffsNotification {
                    diffs: ApiDiffs {
                        api_info: ApiInfoWithType::from(&info),
                        diffs,
                    },
                })),
                Err(e) => error!(api_id, error = %e, "Failed to get API info, skipping notification"),
            }
        }

        for notification in notifications {
            let api_id = notification.api_id();
            match self.accessor.notify(&self.module_name, api_id, notification).await {
                Ok(()) => {
                    report.notified += 1;
                    metrics::record_notification(&self.module_name, "queued");
                }
                Err(e) => {
                    error!(api_id, error = %e, "Failed to send notification, aborting flush");
                    metrics::record_notification(&self.module_name, "error");
                    report.aborted = true;
                    break;
                }
            }
        }

        let mut state = self.state.write();
        report.cleared_diffs = state.total_unique_diffs;
        state.api_to_diffs.clear();
        state.total_unique_diffs = 0;
        metrics::set_diffs_pending(0);
        drop(state);

        info!(
            apis = report.pending_apis,
            notified = report.notified,
            cleared = report.cleared_diffs,
            aborted = report.aborted,
            "Spec diffs flushed"
        );
        report
    }
}

fn spec_timestamp(info: &ApiInfo, spec_type: SpecType) -> DateTime<Utc> {
    match spec_type {
        SpecType::Provided => info.provided_spec_created_at,
        SpecType::Reconstructed => info.reconstructed_spec_created_at,
        SpecType::None => DateTime::<Utc>::default(),
    }
}

fn sorted(mut diffs: Vec<Diff>) -> Vec<Diff> {
    diffs.sort_by_key(|d| d.last_seen);
    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::InMemoryAccessor;
    use chrono::TimeZone;

    fn aggregator(threshold: usize) -> DiffAggregator {
        let apis = (1..=3).map(|id| ApiInfo {
            id,
            name: format!("api-{id}"),
            provided_spec_created_at: Utc.timestamp_opt(1_000, 0).unwrap(),
            ..Default::default()
        });
        DiffAggregator::new("spec_differ", Arc::new(InMemoryAccessor::new(apis)), threshold, false)
    }

    fn event(api_id: u32, secs: i64) -> ApiEvent {
        ApiEvent {
            api_info_id: api_id,
            time: Utc.timestamp_opt(secs, 0).unwrap(),
            method: "GET".into(),
            path: "/pets".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dedup_refreshes_last_seen() {
        let agg = aggregator(500);

        assert_eq!(
            agg.record_diff(&event(1, 10), "A", "B", DiffType::General, SpecType::Provided).await,
            RecordOutcome::New
        );
        assert_eq!(
            agg.record_diff(&event(2, 10), "A", "B", DiffType::General, SpecType::Provided).await,
            RecordOutcome::New
        );
        assert_eq!(
            agg.record_diff(&event(1, 20), "A", "B", DiffType::General, SpecType::Provided).await,
            RecordOutcome::Duplicate
        );

        assert_eq!(agg.total_unique_diffs(), 2);
        let snapshot = agg.snapshot();
        assert_eq!(snapshot[&1].len(), 1);
        assert_eq!(snapshot[&1][0].last_seen, Utc.timestamp_opt(20, 0).unwrap());
        assert_eq!(snapshot[&1][0].spec_timestamp, Utc.timestamp_opt(1_000, 0).unwrap());
        assert_eq!(snapshot[&2].len(), 1);
    }

    #[tokio::test]
    async fn test_no_diff_and_unknown_api_are_ignored() {
        let agg = aggregator(500);

        assert_eq!(
            agg.record_diff(&event(1, 0), "A", "B", DiffType::NoDiff, SpecType::Provided).await,
            RecordOutcome::SkippedNoDiff
        );
        assert_eq!(
            agg.record_diff(&event(99, 0), "A", "B", DiffType::Zombie, SpecType::Provided).await,
            RecordOutcome::ApiInfoUnavailable
        );
        assert_eq!(agg.total_unique_diffs(), 0);
    }

    #[tokio::test]
    async fn test_threshold_is_exclusive() {
        let agg = aggregator(2);
        for i in 0..3 {
            let outcome = agg
                .record_diff(&event(1, i), &format!("new-{i}"), "old", DiffType::Shadow, SpecType::Reconstructed)
                .await;
            assert_eq!(outcome, RecordOutcome::New);
        }

        let outcome = agg.record_diff(&event(3, 0), "X", "Y", DiffType::Shadow, SpecType::Provided).await;
        assert_eq!(outcome, RecordOutcome::DroppedThreshold);
        assert_eq!(agg.total_unique_diffs(), 3);
        assert!(!agg.snapshot().contains_key(&3));
    }

    #[tokio::test]
    async fn test_spec_type_in_hash() {
        let accessor = Arc::new(InMemoryAccessor::new([ApiInfo {
            id: 1,
            ..Default::default()
        }]));
        let merged = DiffAggregator::new("spec_differ", accessor.clone(), 500, false);
        let split = DiffAggregator::new("spec_differ", accessor, 500, true);

        for agg in [&merged, &split] {
            agg.record_diff(&event(1, 0), "A", "B", DiffType::General, SpecType::Provided).await;
            agg.record_diff(&event(1, 0), "A", "B", DiffType::General, SpecType::Reconstructed).await;
        }
        assert_eq!(merged.total_unique_diffs(), 1);
        assert_eq!(split.total_unique_diffs(), 2);
    }

    #[tokio::test]
    async fn test_flush_clears_state() {
        let agg = aggregator(500);
        assert_eq!(agg.flush().await, FlushReport::default());

        agg.record_diff(&event(1, 5), "A", "B", DiffType::General, SpecType::Provided).await;
        agg.record_diff(&event(1, 1), "C", "D", DiffType::General, SpecType::Provided).await;
        assert_eq!(agg.snapshot()[&1][0].new_spec, "C");

        let report = agg.flush().await;
        assert_eq!(report.pending_apis, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(report.cleared_diffs, 2);
        assert!(!report.aborted);
        assert_eq!(agg.total_unique_diffs(), 0);
        assert!(agg.snapshot().is_empty());
    }
}
