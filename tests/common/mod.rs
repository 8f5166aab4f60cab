//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use trace_analytics::accessor::{
    AccessorError, ApiInfo, BackendAccessor, DiffSource, InMemoryAccessor, SpecDiff, SpeculatorAccessor,
};
use trace_analytics::bus::AnalyticsMessage;
use trace_analytics::differ::{DiffType, Notification};
use trace_analytics::engine::{AnalyzerHandler, Annotation, Annotations, HandlerError, ProcessContext};
use trace_analytics::telemetry::{ApiEvent, Header, Telemetry, TraceMessage};

/// Host and port every test API is served on.
pub const HOST: &str = "pets";
pub const PORT: u16 = 8080;

pub fn api_info(id: u32, name: &str) -> ApiInfo {
    ApiInfo {
        id,
        name: name.to_string(),
        port: PORT,
        has_provided_spec: true,
        ..Default::default()
    }
}

/// A trace of `method path` against api `api_id`.
pub fn trace(event_id: u64, api_id: u32, method: &str, path: &str) -> TraceMessage {
    let event = ApiEvent {
        id: event_id,
        api_info_id: api_id,
        method: method.to_string(),
        path: path.to_string(),
        host_spec_name: HOST.to_string(),
        destination_port: PORT,
        ..Default::default()
    };

    let mut telemetry = Telemetry {
        request_id: format!("req-{event_id}"),
        scheme: "http".to_string(),
        destination_address: format!("10.0.0.1:{PORT}"),
        ..Default::default()
    };
    telemetry.request.method = method.to_string();
    telemetry.request.path = path.to_string();
    telemetry.request.host = format!("{HOST}:{PORT}");
    telemetry.response.status_code = "200".to_string();

    TraceMessage::new(event, telemetry)
}

pub fn with_json_body(mut message: TraceMessage, body: serde_json::Value) -> TraceMessage {
    message
        .telemetry
        .request
        .common
        .headers
        .push(Header::new("content-type", "application/json"));
    message.telemetry.request.common.body = body.to_string().into_bytes();
    message
}

pub fn spec_diff(diff_type: DiffType, tag: &str) -> SpecDiff {
    SpecDiff {
        diff_type,
        old_spec: format!("old-{tag}"),
        new_spec: format!("new-{tag}"),
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// What a [`RecordingHandler`] saw for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub handler: String,
    pub shard_id: usize,
    pub partition_key: i64,
    pub annotations_in: usize,
}

pub type ObservationLog = Arc<Mutex<Vec<Observation>>>;

/// Handler that records what it receives and appends one annotation.
pub struct RecordingHandler {
    name: String,
    priority: i32,
    log: ObservationLog,
    republish_to: Option<String>,
    fail: bool,
    panic: AtomicBool,
}

impl RecordingHandler {
    pub fn new(name: &str, priority: i32, log: ObservationLog) -> Self {
        Self {
            name: name.to_string(),
            priority,
            log,
            republish_to: None,
            fail: false,
            panic: AtomicBool::new(false),
        }
    }

    /// Re-publish every message as a custom message on `topic`.
    pub fn republishing(mut self, topic: &str) -> Self {
        self.republish_to = Some(topic.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Panic on the first message only.
    pub fn panicking_once(self) -> Self {
        self.panic.store(true, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl AnalyzerHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn process(
        &self,
        ctx: ProcessContext<'_>,
        message: &AnalyticsMessage,
        mut annotations: Annotations,
    ) -> Result<Annotations, HandlerError> {
        use trace_analytics::bus::PartitionedMessage;

        self.log.lock().push(Observation {
            handler: self.name.clone(),
            shard_id: ctx.shard_id,
            partition_key: message.partition_key(),
            annotations_in: annotations.len(),
        });

        if self.panic.swap(false, Ordering::SeqCst) {
            panic!("{} exploded", self.name);
        }
        if self.fail {
            return Err(HandlerError::failed(&self.name, "injected failure"));
        }

        if let Some(topic) = &self.republish_to {
            let forwarded = AnalyticsMessage::custom(message.partition_key(), "forwarded", self.name.clone());
            ctx.publisher
                .publish(topic, forwarded)
                .await
                .map_err(|source| HandlerError::Publish {
                    handler: self.name.clone(),
                    source,
                })?;
        }

        annotations.push(Annotation::opaque(self.name.clone()));
        Ok(annotations)
    }
}

/// Accessor wrapping [`InMemoryAccessor`] that records notifications and
/// can be told to fail.
pub struct RecordingAccessor {
    pub inner: InMemoryAccessor,
    pub notifications: Mutex<Vec<(String, u32, Notification)>>,
    pub fail_notify: AtomicBool,
    pub fail_update: AtomicBool,
    pub api_info_calls: AtomicUsize,
}

impl RecordingAccessor {
    pub fn new(apis: impl IntoIterator<Item = ApiInfo>) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryAccessor::new(apis),
            notifications: Mutex::new(Vec::new()),
            fail_notify: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            api_info_calls: AtomicUsize::new(0),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::new(Vec::<ApiInfo>::new())
    }

    pub fn notifications(&self) -> Vec<(String, u32, Notification)> {
        self.notifications.lock().clone()
    }

    /// Register a provided spec for the test host that answers `diff`.
    pub fn provided_diff(&self, diff: SpecDiff) {
        let key = trace_analytics::accessor::spec_key(HOST, PORT);
        let speculator = self.inner.in_memory_speculator();
        speculator.set_provided_spec(&key);
        speculator.set_diff(&key, DiffSource::Provided, diff);
    }

    /// Register an approved reconstructed spec for the test host that
    /// answers `diff`.
    pub fn reconstructed_diff(&self, diff: SpecDiff) {
        let key = trace_analytics::accessor::spec_key(HOST, PORT);
        let speculator = self.inner.in_memory_speculator();
        speculator.set_approved_spec(&key);
        speculator.set_diff(&key, DiffSource::Reconstructed, diff);
    }
}

#[async_trait]
impl BackendAccessor for RecordingAccessor {
    async fn get_api_info(&self, api_id: u32) -> Result<ApiInfo, AccessorError> {
        self.api_info_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_api_info(api_id).await
    }

    async fn update_api_event(&self, event: &ApiEvent) -> Result<(), AccessorError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(AccessorError::Backend("event store unavailable".to_string()));
        }
        self.inner.update_api_event(event).await
    }

    async fn notify(&self, module_name: &str, api_id: u32, notification: Notification) -> Result<(), AccessorError> {
        if self.fail_notify.load(Ordering::SeqCst) {
            return Err(AccessorError::Backend("notification sink unavailable".to_string()));
        }
        self.notifications
            .lock()
            .push((module_name.to_string(), api_id, notification));
        Ok(())
    }

    async fn enable_traces(&self, module_name: &str, api_id: u32) -> Result<(), AccessorError> {
        self.inner.enable_traces(module_name, api_id).await
    }

    async fn disable_traces(&self, module_name: &str, api_id: u32) -> Result<(), AccessorError> {
        self.inner.disable_traces(module_name, api_id).await
    }

    fn speculator(&self) -> Arc<dyn SpeculatorAccessor> {
        self.inner.speculator()
    }
}
