//! Typed resource declarations and the per-run bundle.
//!
//! A [`Resource`] is a typed, named desired-state declaration; a
//! [`ResourceBundle`] owns the resources and their dependency graph for
//! one run, validates it and produces a deterministic execution order at
//! bind time.

mod bundle;
mod hash;
mod spec;

pub use bundle::{BoundBundle, ResourceBundle};
pub use hash::SpecHasher;
pub use spec::{
    DirectorySpec, FileSpec, LinkSpec, Policy, RecordSpec, Resource, ResourceKind, ResourceRef,
    ResourceType, ServiceSpec, ZoneSpec,
};
