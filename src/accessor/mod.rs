//! Collaborators the analytics core depends on but does not own.
//!
//! # Responsibilities
//! - API inventory lookups (`get_api_info`)
//! - Event persistence (`update_api_event`)
//! - Outbound notifications (`notify`)
//! - Per-API trace enablement (`enable_traces` / `disable_traces`)
//! - Spec diffing through the speculator
//!
//! The core only sees the traits below. `memory.rs` provides an in-process
//! implementation backed by configuration; `notifier.rs` delivers envelopes
//! over HTTP.

pub mod memory;
pub mod notifier;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::differ::{DiffType, Notification};
use crate::telemetry::{ApiEvent, Telemetry};

pub use memory::{spec_key, telemetry_spec_key, InMemoryAccessor, InMemorySpeculator};
pub use notifier::{Notifier, NotifierError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiType {
    #[default]
    Internal,
    External,
}

/// API identity as stored by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiInfo {
    pub id: u32,
    pub name: String,
    pub port: u16,
    pub destination_namespace: String,
    pub has_provided_spec: bool,
    pub has_reconstructed_spec: bool,
    pub provided_spec_created_at: DateTime<Utc>,
    pub reconstructed_spec_created_at: DateTime<Utc>,
    pub api_type: ApiType,
    pub trace_source_id: Uuid,
}

#[derive(Debug, Error)]
pub enum AccessorError {
    #[error("API {0} not found")]
    ApiNotFound(u32),

    #[error("module '{0}' is not known")]
    UnknownModule(String),

    #[error("notification failed: {0}")]
    Notify(#[from] NotifierError),

    #[error("spec diff failed: {0}")]
    Diff(String),

    #[error("{0}")]
    Backend(String),
}

/// Result of diffing one trace against a spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecDiff {
    pub diff_type: DiffType,
    pub old_spec: String,
    pub new_spec: String,
}

/// Which spec a trace is diffed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffSource {
    Provided,
    Reconstructed,
}

/// Spec inference engine.
pub trait SpeculatorAccessor: Send + Sync {
    fn has_provided_spec(&self, spec_key: &str) -> bool;

    fn has_approved_spec(&self, spec_key: &str) -> bool;

    fn diff_telemetry(&self, telemetry: &Telemetry, source: DiffSource) -> Result<SpecDiff, AccessorError>;
}

/// Backend the analytics modules talk to.
#[async_trait]
pub trait BackendAccessor: Send + Sync {
    async fn get_api_info(&self, api_id: u32) -> Result<ApiInfo, AccessorError>;

    async fn update_api_event(&self, event: &ApiEvent) -> Result<(), AccessorError>;

    async fn notify(&self, module_name: &str, api_id: u32, notification: Notification) -> Result<(), AccessorError>;

    async fn enable_traces(&self, module_name: &str, api_id: u32) -> Result<(), AccessorError>;

    async fn disable_traces(&self, module_name: &str, api_id: u32) -> Result<(), AccessorError>;

    fn speculator(&self) -> Arc<dyn SpeculatorAccessor>;
}
