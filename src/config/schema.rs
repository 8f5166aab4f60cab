//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! analytics service. All types derive Serde traits for deserialization
//! from TOML.

use serde::{Deserialize, Serialize};

use crate::accessor::ApiInfo;
use crate::settings::{ArgIdentifier, AuthInfoType};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// HTTP listener for telemetry ingest and module routes.
    pub listener: ListenerConfig,

    /// Dispatch engine sizing.
    pub engine: EngineConfig,

    /// Spec differ settings.
    pub differ: DifferConfig,

    /// Outbound notification delivery.
    pub notifier: NotifierConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    /// Initial analyze settings; re-applied on hot reload.
    pub settings: SettingsConfig,

    /// Static API inventory served by the in-memory accessor.
    pub apis: Vec<ApiInfo>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted telemetry body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Dispatch engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Shards per topic.
    pub num_workers: usize,

    /// Capacity of every shard queue.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue_capacity: crate::bus::SHARD_QUEUE_CAPACITY,
        }
    }
}

/// Spec differ configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DifferConfig {
    /// Seconds between notification flushes.
    /// Overridden by `DIFFER_SEND_NOTIFICATION_INTERVAL_SEC`.
    pub send_notification_interval_secs: u64,

    /// Unique diffs above which new diffs are dropped until the next flush.
    /// Overridden by `DIFF_SEND_THRESHOLD`.
    pub diff_send_threshold: usize,

    /// Mix the spec type into the dedup hash.
    pub hash_includes_spec_type: bool,
}

impl Default for DifferConfig {
    fn default() -> Self {
        Self {
            send_notification_interval_secs: 300,
            diff_send_threshold: 500,
            hash_includes_spec_type: false,
        }
    }
}

/// Notification delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Notification API prefix; notifications are dropped when unset.
    pub url: Option<String>,

    pub max_queue_size: usize,

    pub workers: usize,

    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_queue_size: 100,
            workers: 10,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. "info", "trace_analytics=debug").
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "trace_analytics=info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Module route protection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bearer key required on `/modules` routes; open when unset.
    pub api_key: Option<String>,
}

/// Analyze settings as written in the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SettingsConfig {
    pub api_naming_rules: Vec<ApiNamingRuleConfig>,
    pub nav_args: Vec<NavArgConfig>,
    pub auth_rules: Vec<AuthRuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiNamingRuleConfig {
    pub api_name: String,
    pub host: String,
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
}

fn default_url_prefix() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NavArgConfig {
    pub id: String,
    #[serde(flatten)]
    pub arg: ArgIdentifier,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AuthRuleConfig {
    pub id: String,
    #[serde(flatten)]
    pub arg: ArgIdentifier,
    pub auth_type: AuthInfoType,
}
