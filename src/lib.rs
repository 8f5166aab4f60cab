//! In-process API trace analytics.
//!
//! Traces are published on a partitioned bus, run through per-topic
//! handler chains, and spec diffs are aggregated into periodic per-API
//! notifications.

pub mod accessor;
pub mod admin;
pub mod bus;
pub mod config;
pub mod differ;
pub mod engine;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod profiles;
pub mod settings;
pub mod telemetry;

pub use config::schema::AnalyticsConfig;
pub use http::HttpServer;
pub use lifecycle::{AnalyticsHost, Shutdown};
