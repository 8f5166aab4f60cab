//! Spec differ module.
//!
//! # Data Flow
//! ```text
//! trace topic
//!     → handler.rs (speculator diff, event update)
//!     → aggregator.rs (dedup by content hash, threshold)
//!     → sender.rs (flush every interval)
//!     → accessor.notify("spec_differ", api_id, SpecDiffsNotification)
//! ```

pub mod aggregator;
pub mod handler;
pub mod sender;
pub mod types;

pub use aggregator::{DiffAggregator, FlushReport, RecordOutcome};
pub use handler::{SpecDiffHandler, SPEC_DIFF_PRIORITY};
pub use sender::run_flush_loop;
pub use types::{
    ApiDiffs, ApiInfoWithType, Diff, DiffHash, DiffType, Notification, SpecDiffsNotification, SpecType,
};

/// Name the differ registers and notifies under.
pub const MODULE_NAME: &str = "spec_differ";
