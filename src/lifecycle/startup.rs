//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the analytics components in dependency order
//! - Register the built-in trace handlers
//! - Start shard loops, the diff flush loop and the notifier
//!
//! # Design Decisions
//! - Components are constructed here and passed down explicitly; nothing
//!   is process-global
//! - Handlers are registered before the host is handed out, so chains are
//!   complete before the first publish

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::accessor::{BackendAccessor, InMemoryAccessor, Notifier, NotifierError};
use crate::bus::{topics, AnalyticsMessage, BusError};
use crate::config::{AnalyticsConfig, SettingsConfig};
use crate::differ::{run_flush_loop, DiffAggregator, SpecDiffHandler, MODULE_NAME};
use crate::engine::AnalyticsEngine;
use crate::lifecycle::Shutdown;
use crate::profiles::ProfileStore;
use crate::settings::AnalyzeSettings;
use crate::telemetry::{TraceAnnotator, TraceMessage};

/// Modules the host answers for on the module routes.
pub const MODULES: [&str; 1] = [MODULE_NAME];

/// Owner of every analytics component.
pub struct AnalyticsHost {
    config: AnalyticsConfig,
    engine: Arc<AnalyticsEngine>,
    aggregator: Arc<DiffAggregator>,
    settings: Arc<AnalyzeSettings>,
    profiles: Arc<ProfileStore>,
    accessor: Arc<dyn BackendAccessor>,
    shutdown: Shutdown,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl AnalyticsHost {
    /// Build and start everything with a fresh shutdown coordinator.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: AnalyticsConfig, accessor: Arc<dyn BackendAccessor>) -> Self {
        Self::start_with_shutdown(config, accessor, Shutdown::new())
    }

    pub fn start_with_shutdown(config: AnalyticsConfig, accessor: Arc<dyn BackendAccessor>, shutdown: Shutdown) -> Self {
        let settings = Arc::new(AnalyzeSettings::from_config(&config.settings));
        let profiles = Arc::new(ProfileStore::new());
        let engine = Arc::new(AnalyticsEngine::new(
            config.engine.num_workers,
            config.engine.queue_capacity,
            shutdown.clone(),
        ));
        let aggregator = Arc::new(DiffAggregator::new(
            MODULE_NAME,
            accessor.clone(),
            config.differ.diff_send_threshold,
            config.differ.hash_includes_spec_type,
        ));

        engine.register_handler(
            topics::TRACE,
            Arc::new(TraceAnnotator::new(settings.clone(), profiles.clone())),
        );
        engine.register_handler(
            topics::TRACE,
            Arc::new(SpecDiffHandler::new(accessor.clone(), aggregator.clone())),
        );

        let interval = Duration::from_secs(config.differ.send_notification_interval_secs);
        let flush_task = tokio::spawn(run_flush_loop(aggregator.clone(), interval, shutdown.subscribe()));

        tracing::info!(
            num_workers = engine.num_workers(),
            topics = ?engine.topics(),
            interval_secs = interval.as_secs(),
            threshold = config.differ.diff_send_threshold,
            "Analytics host started"
        );

        Self {
            config,
            engine,
            aggregator,
            settings,
            profiles,
            accessor,
            shutdown,
            flush_task: Mutex::new(Some(flush_task)),
        }
    }

    /// Publish a trace on the *trace* topic.
    pub async fn publish(&self, message: TraceMessage) -> Result<(), BusError> {
        self.engine.publish(topics::TRACE, AnalyticsMessage::trace(message)).await
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<AnalyticsEngine> {
        &self.engine
    }

    pub fn aggregator(&self) -> &Arc<DiffAggregator> {
        &self.aggregator
    }

    pub fn settings(&self) -> &Arc<AnalyzeSettings> {
        &self.settings
    }

    pub fn profiles(&self) -> &Arc<ProfileStore> {
        &self.profiles
    }

    pub fn accessor(&self) -> &Arc<dyn BackendAccessor> {
        &self.accessor
    }

    pub fn has_module(&self, name: &str) -> bool {
        MODULES.contains(&name)
    }

    /// Replace the analyze settings (hot reload).
    pub fn apply_settings(&self, settings: &SettingsConfig) {
        self.settings.replace_all(settings);
    }

    /// Stop shard loops and the flush loop, waiting for both.
    pub async fn shutdown(&self) {
        tracing::info!("Analytics host shutting down");
        self.engine.stop().await;
        let flush_task = self.flush_task.lock().take();
        if let Some(task) = flush_task {
            let _ = task.await;
        }
    }

    pub fn shutdown_handle(&self) -> &Shutdown {
        &self.shutdown
    }
}

/// In-memory accessor for `config`, with a running notifier when a
/// notification url is configured.
pub fn in_memory_accessor(config: &AnalyticsConfig, shutdown: &Shutdown) -> Result<Arc<InMemoryAccessor>, NotifierError> {
    let accessor = InMemoryAccessor::new(config.apis.iter().cloned());
    let Some(url) = &config.notifier.url else {
        return Ok(Arc::new(accessor));
    };

    let notifier = Notifier::new(
        url,
        config.notifier.max_queue_size,
        config.notifier.workers,
        Duration::from_secs(config.notifier.timeout_secs),
    )?;
    notifier.start(shutdown);
    Ok(Arc::new(accessor.with_notifier(Arc::new(notifier))))
}
