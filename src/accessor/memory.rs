//! In-process accessor backed by the configured API inventory.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::accessor::{
    AccessorError, ApiInfo, BackendAccessor, DiffSource, Notifier, SpecDiff, SpeculatorAccessor,
};
use crate::differ::Notification;
use crate::telemetry::{ApiEvent, Telemetry};

/// `"<host>:<port>"`, the key specs are stored under.
pub fn spec_key(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

/// Spec key of the service a trace was sent to.
pub fn telemetry_spec_key(telemetry: &Telemetry) -> String {
    let host = telemetry.request.host.as_str();
    let host = host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host);
    let port = telemetry
        .destination_address
        .rsplit_once(':')
        .and_then(|(_, p)| p.parse().ok())
        .unwrap_or(80);
    spec_key(host, port)
}

#[derive(Default)]
struct SpecState {
    provided: bool,
    approved: bool,
    diffs: HashMap<DiffSource, SpecDiff>,
}

/// Speculator stand-in: knows no specs until told otherwise, and answers
/// diff requests with whatever result was registered for the key.
#[derive(Default)]
pub struct InMemorySpeculator {
    specs: RwLock<HashMap<String, SpecState>>,
}

impl InMemorySpeculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_provided_spec(&self, spec_key: &str) {
        self.specs.write().entry(spec_key.to_string()).or_default().provided = true;
    }

    pub fn set_approved_spec(&self, spec_key: &str) {
        self.specs.write().entry(spec_key.to_string()).or_default().approved = true;
    }

    /// Result returned for every trace to `spec_key` diffed against `source`.
    pub fn set_diff(&self, spec_key: &str, source: DiffSource, diff: SpecDiff) {
        self.specs
            .write()
            .entry(spec_key.to_string())
            .or_default()
            .diffs
            .insert(source, diff);
    }
}

impl SpeculatorAccessor for InMemorySpeculator {
    fn has_provided_spec(&self, spec_key: &str) -> bool {
        self.specs.read().get(spec_key).is_some_and(|s| s.provided)
    }

    fn has_approved_spec(&self, spec_key: &str) -> bool {
        self.specs.read().get(spec_key).is_some_and(|s| s.approved)
    }

    fn diff_telemetry(&self, telemetry: &Telemetry, source: DiffSource) -> Result<SpecDiff, AccessorError> {
        let key = telemetry_spec_key(telemetry);
        let specs = self.specs.read();
        let state = specs
            .get(&key)
            .ok_or_else(|| AccessorError::Diff(format!("no spec for {key}")))?;
        let known = match source {
            DiffSource::Provided => state.provided,
            DiffSource::Reconstructed => state.approved,
        };
        if !known {
            return Err(AccessorError::Diff(format!("no {source:?} spec for {key}")));
        }
        Ok(state.diffs.get(&source).cloned().unwrap_or_default())
    }
}

/// Accessor keeping everything in memory.
pub struct InMemoryAccessor {
    apis: RwLock<HashMap<u32, ApiInfo>>,
    events: RwLock<HashMap<u64, ApiEvent>>,
    traces_enabled: RwLock<HashSet<(String, u32)>>,
    speculator: Arc<InMemorySpeculator>,
    notifier: Option<Arc<Notifier>>,
}

impl InMemoryAccessor {
    pub fn new(apis: impl IntoIterator<Item = ApiInfo>) -> Self {
        Self {
            apis: RwLock::new(apis.into_iter().map(|api| (api.id, api)).collect()),
            events: RwLock::new(HashMap::new()),
            traces_enabled: RwLock::new(HashSet::new()),
            speculator: Arc::new(InMemorySpeculator::new()),
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn add_api(&self, api: ApiInfo) {
        self.apis.write().insert(api.id, api);
    }

    pub fn in_memory_speculator(&self) -> &Arc<InMemorySpeculator> {
        &self.speculator
    }

    pub fn event(&self, id: u64) -> Option<ApiEvent> {
        self.events.read().get(&id).cloned()
    }

    pub fn traces_enabled(&self, module_name: &str, api_id: u32) -> bool {
        self.traces_enabled.read().contains(&(module_name.to_string(), api_id))
    }
}

#[async_trait]
impl BackendAccessor for InMemoryAccessor {
    async fn get_api_info(&self, api_id: u32) -> Result<ApiInfo, AccessorError> {
        self.apis
            .read()
            .get(&api_id)
            .cloned()
            .ok_or(AccessorError::ApiNotFound(api_id))
    }

    async fn update_api_event(&self, event: &ApiEvent) -> Result<(), AccessorError> {
        self.events.write().insert(event.id, event.clone());
        Ok(())
    }

    async fn notify(&self, module_name: &str, api_id: u32, notification: Notification) -> Result<(), AccessorError> {
        match &self.notifier {
            Some(notifier) => Ok(notifier.notify(module_name, api_id, notification)?),
            None => {
                debug!(module = module_name, api_id, "No notifier configured, dropping notification");
                Ok(())
            }
        }
    }

    async fn enable_traces(&self, module_name: &str, api_id: u32) -> Result<(), AccessorError> {
        self.get_api_info(api_id).await?;
        self.traces_enabled.write().insert((module_name.to_string(), api_id));
        info!(module = module_name, api_id, "Traces enabled");
        Ok(())
    }

    async fn disable_traces(&self, module_name: &str, api_id: u32) -> Result<(), AccessorError> {
        self.get_api_info(api_id).await?;
        self.traces_enabled.write().remove(&(module_name.to_string(), api_id));
        info!(module = module_name, api_id, "Traces disabled");
        Ok(())
    }

    fn speculator(&self) -> Arc<dyn SpeculatorAccessor> {
        self.speculator.clone()
    }
}
