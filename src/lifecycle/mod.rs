//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build accessor → AnalyticsHost::start → Listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop shard loops and flush loop → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Queued messages are not drained on shutdown; there is no persistence

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{in_memory_accessor, AnalyticsHost, MODULES};
