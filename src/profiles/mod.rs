//! Endpoint profiles attached to annotated traces.

pub mod store;

pub use store::{EndpointProfile, ProfileStore};
