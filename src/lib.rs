// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are flagged
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![warn(missing_docs)]                // Public items should be documented
#![warn(unused_imports)]              // Unused imports are flagged
#![warn(unused_must_use)]             // Handle Result and Option explicitly

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Converge
//!
//! A declarative, idempotent infrastructure provisioning engine with
//! resumable state and change-driven re-application.
//!
//! ## Overview
//!
//! Converge applies a graph of typed resource declarations (files,
//! links, services, DNS zones) against a target environment through a
//! pluggable transport:
//!
//! - Declare desired state in a `Convergefile.yaml` bundle
//! - Apply it idempotently: a converged target yields "nothing changed"
//! - Resume safely after partial failure without re-running completed
//!   resources
//! - Watch external change sources and re-apply as events occur
//!
//! ## Architecture
//!
//! 1. **Bundle**: the typed resources plus dependency graph for one run
//! 2. **Providers**: policy-specific logic selected per (type, policy)
//! 3. **Engine**: sequential topological apply with persisted progress
//! 4. **Change sources**: cooperative pollers busting cached graph
//!    values
//!
//! ## Modules
//!
//! - [`resource`]: resource declarations, bundle and dependency graph
//! - [`provider`]: provider registry and built-in providers
//! - [`engine`]: apply engine, run context and watch mode
//! - [`state`]: versioned persistent state over local or cloud backends
//! - [`reconciler`]: desired-vs-observed record synchroniser
//! - [`source`]: change-source pollers and atomic changesets
//! - [`changelog`]: per-resource scoped audit trail
//! - [`transport`]: target-environment capability contract
//! - [`cloud`]: cloud driver contracts
//! - [`config`]: bundle file loading
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```yaml
//! cluster: example
//!
//! resources:
//!   - type: directory
//!     name: /etc/app
//!   - type: link
//!     name: /etc/app/current
//!     to: /srv/app/v2
//!     requires: ["Directory[/etc/app]"]
//!
//! sources:
//!   - kind: git
//!     name: changesource
//!     repository: https://example.com/app.git
//!     polling-interval: 30
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod changelog;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod engine;
pub mod error;
pub mod provider;
pub mod reconciler;
pub mod resource;
pub mod source;
pub mod state;
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use changelog::{ChangeLog, LogFormat, ResourceChange};
pub use cli::{Cli, Commands, StatusFormatter};
pub use cloud::{DnsDriver, DnsDriverRegistry, DriverConfig};
pub use config::{find_bundle_file, BundleFile, BundleLoader};
pub use engine::{run_watch, ApplyEngine, Context, RunOptions};
pub use error::{ConvergeError, Result};
pub use provider::{Provider, ProviderRegistry};
pub use reconciler::{RecordWriter, SyncRecord, Synchroniser};
pub use resource::{Policy, Resource, ResourceBundle, ResourceType};
pub use source::{CacheBust, ChangeManager, ChangeSource, GitChangeSource, HostedEventsSource};
pub use state::{
    CloudStateBackend, LocalStateBackend, PartStore, SimulatedStateStore, StateStore,
};
pub use transport::{LocalTransport, Transport};
