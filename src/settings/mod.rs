//! Analyze settings registry.
//!
//! Rules here are read by the trace annotator on every message and written
//! by configuration (startup and hot reload).

pub mod registry;

pub use registry::{AnalyzeSettings, ApiNamingRule, ArgIdentifier, ArgType, AuthInfoType};
