//! Bundle file loading.
//!
//! The engine consumes plain YAML bundle files; the templating language
//! that may generate them is an external collaborator. This module
//! provides the file schema, discovery and loading, plus typed access to
//! open-ended parameter maps.

mod parser;
mod spec;
mod values;

pub use parser::{find_bundle_file, BundleLoader, DEFAULT_BUNDLE_FILES};
pub use spec::{BundleFile, SourceConfig, SourceKind, StateBackendKind, StateConfig};
pub use values::ConfigMap;
