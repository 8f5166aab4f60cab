//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, body limit)
//!     → /modules/...   → admin (version, start/stop traces)
//!     → /api/telemetry → ingest.rs → AnalyticsHost::publish
//! ```

pub mod ingest;
pub mod server;

pub use server::{AppState, HttpServer};
