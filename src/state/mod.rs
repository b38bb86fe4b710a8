//! Persistent run state.
//!
//! The engine records per-part state blobs inside a versioned envelope
//! `{version, timestamp, parts}` persisted through a pluggable backend:
//! a single local file, or a remote object keyed by the cluster name.
//! A read-only wrapper captures writes in memory for dry-run applies.

mod cloud;
mod local;
mod simulated;
pub(crate) mod store;

pub use cloud::CloudStateBackend;
pub use local::LocalStateBackend;
pub use simulated::SimulatedStateStore;
pub use store::{PartStore, SharedState, StateBackend, StateStore, STATE_VERSION};
