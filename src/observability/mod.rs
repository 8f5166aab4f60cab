//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges via the metrics facade)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Log fields are structured (`topic`, `shard`, `api_id`, ...) so JSON
//!   output is machine readable
//! - Metric updates are plain facade calls; no recorder means no cost

pub mod logging;
pub mod metrics;
