//! Telemetry model and the trace annotator.
//!
//! # Data Flow
//! ```text
//! TraceMessage (event + raw telemetry)
//!     → annotator.rs (api name, endpoint name, auth discovery)
//!         → extract.rs (cookies, query, JSON/form bodies, JWT claims)
//!         → settings registry (naming, nav-arg and auth rules)
//!         → profile store (endpoint profile)
//!     → AnnotatedTrace appended to the chain's annotations
//! ```

pub mod annotated;
pub mod annotator;
pub mod extract;
pub mod types;

pub use annotated::{AnnotatedTrace, ArgInstances, ArgMap};
pub use annotator::{TraceAnnotator, ANNOTATOR_NAME, ANNOTATOR_PRIORITY};
pub use types::{ApiEvent, Common, Header, Request, Response, Telemetry, TraceMessage};
