//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, environment overrides)
//!     → validation.rs (semantic checks)
//!     → AnalyticsConfig (validated, immutable)
//!     → consumed once by AnalyticsHost::start
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates the new file
//!     → the `settings` section replaces the analyze settings wholesale
//!     → every other section waits for a restart
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - `DIFFER_SEND_NOTIFICATION_INTERVAL_SEC` and `DIFF_SEND_THRESHOLD`
//!   override the file

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{default_config, load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AnalyticsConfig, ApiNamingRuleConfig, AuthRuleConfig, DifferConfig, EngineConfig, ListenerConfig,
    LogFormat, NavArgConfig, NotifierConfig, ObservabilityConfig, SettingsConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
