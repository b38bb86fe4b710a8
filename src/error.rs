//! Error types for the Converge provisioning engine.
//!
//! This module provides the error hierarchy for all phases of a run:
//! configuration and binding, state management, transports, providers,
//! cloud drivers, and change-source polling.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Converge engine.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Configuration and bind-time errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State store errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Provider errors raised while converging a resource.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Transport errors.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Cloud driver errors.
    #[error("Cloud driver error: {0}")]
    Cloud(#[from] CloudError),

    /// Change source polling errors.
    #[error("Change source error: {0}")]
    Poll(#[from] PollError),

    /// A resource's provider failed; the run aborts at this resource.
    #[error("Failed to converge {resource}: {source}")]
    ResourceFailed {
        /// Identity of the failing resource.
        resource: String,
        /// The underlying failure.
        #[source]
        source: Box<ConvergeError>,
    },

    /// The run completed but nothing needed to change.
    ///
    /// Not a failure: a distinguished no-op signal for automation,
    /// reported through its own exit code.
    #[error("No changes were required")]
    NothingChanged,

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration and bind-time errors. All fatal before any mutation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The bundle file was not found.
    #[error("Bundle file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The bundle file could not be parsed.
    #[error("Failed to parse bundle: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Two resources share the same identity.
    #[error("Duplicate {type_name} resource: {name}")]
    DuplicateResource {
        /// Resource type name.
        type_name: String,
        /// The duplicated resource name.
        name: String,
    },

    /// A dependency reference does not resolve within the bundle.
    #[error("Resource {resource} requires {reference}, which is not in the bundle")]
    UnresolvedDependency {
        /// The resource carrying the reference.
        resource: String,
        /// The unresolved reference.
        reference: String,
    },

    /// A dependency reference could not be parsed.
    #[error("Invalid dependency reference '{reference}' (expected Type[name])")]
    InvalidReference {
        /// The malformed reference string.
        reference: String,
    },

    /// The dependency graph contains a cycle.
    #[error("Dependency cycle detected: {cycle}")]
    DependencyCycle {
        /// The resources participating in the cycle.
        cycle: String,
    },

    /// No provider matched a resource's policy.
    #[error("No provider for {resource} with policy {policy}")]
    NoProvider {
        /// Identity of the resource.
        resource: String,
        /// The requested policy.
        policy: String,
    },

    /// More than one provider matched a resource's policy.
    #[error("{count} providers match {resource} with policy {policy}")]
    AmbiguousProvider {
        /// Identity of the resource.
        resource: String,
        /// The requested policy.
        policy: String,
        /// Number of matching providers.
        count: usize,
    },

    /// A required field is missing from a configuration map.
    #[error("Missing field '{field}' in {section}")]
    MissingField {
        /// The section being read.
        section: String,
        /// The missing field name.
        field: String,
    },

    /// A configuration field has the wrong type.
    #[error("Field '{field}' in {section}: expected {expected}")]
    WrongType {
        /// The section being read.
        section: String,
        /// The offending field name.
        field: String,
        /// The expected type.
        expected: &'static str,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },
}

/// State store errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// The state envelope carries no recognized version.
    ///
    /// Fatal and non-recoverable: loading never partially populates.
    #[error("State file version {} is not supported", found.map_or_else(|| "<absent>".to_string(), |v| v.to_string()))]
    UnsupportedVersion {
        /// The version found, if any.
        found: Option<u64>,
    },

    /// The state envelope is unreadable.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The remote state object does not exist yet.
    #[error("Remote state object '{key}' does not exist")]
    RemoteMissing {
        /// Object key that was requested.
        key: String,
    },

    /// Backend IO failure.
    #[error("State backend error: {message}")]
    Backend {
        /// Description of the backend failure.
        message: String,
    },

    /// Serialization failure.
    #[error("State serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },
}

/// Provider errors raised while converging a single resource.
///
/// Precondition variants are fatal except under simulate, where the
/// provider degrades them to a logged warning so dry-runs complete.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A symlink's destination does not exist.
    #[error("Destination of symlink {path} does not exist")]
    DanglingSymlink {
        /// The missing destination path.
        path: String,
    },

    /// The requested owner does not exist on the target.
    #[error("User '{name}' does not exist")]
    InvalidUser {
        /// The unknown user name.
        name: String,
    },

    /// The requested group does not exist on the target.
    #[error("Group '{name}' does not exist")]
    InvalidGroup {
        /// The unknown group name.
        name: String,
    },

    /// A path component required by the resource is missing.
    #[error("Path component missing: {path}")]
    MissingPathComponent {
        /// The missing parent path.
        path: String,
    },

    /// The provider refuses to operate on the observed state.
    #[error("{resource}: {message}")]
    InvalidProvider {
        /// Identity of the resource.
        resource: String,
        /// Why the provider refuses.
        message: String,
    },

    /// The provider ran but the target did not reach the expected state.
    #[error("Operation failed: {message}")]
    OperationFailed {
        /// Description of the failure.
        message: String,
    },

    /// A resource attribute is invalid.
    #[error("Invalid attribute {field}: {message}")]
    InvalidAttribute {
        /// The offending attribute.
        field: String,
        /// Why it is invalid.
        message: String,
    },
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A command exited with a non-zero status.
    #[error("Command `{command}` failed with status {status}: {stderr}")]
    CommandFailed {
        /// The command line.
        command: String,
        /// Exit status.
        status: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// A command could not be spawned or its output read.
    #[error("Transport IO error: {message}")]
    Io {
        /// Description of the IO failure.
        message: String,
    },

    /// The transport does not support the requested operation.
    #[error("Transport does not support {operation}")]
    Unsupported {
        /// The unsupported operation.
        operation: String,
    },
}

/// Cloud driver errors.
#[derive(Debug, Error)]
pub enum CloudError {
    /// No driver factory is registered for the configured id.
    #[error("Unknown cloud driver: {id}")]
    UnknownDriver {
        /// The configured driver id.
        id: String,
    },

    /// The driver reported a failure.
    #[error("Cloud driver error: {message}")]
    DriverFailed {
        /// Description of the failure.
        message: String,
    },
}

/// Change source polling errors.
#[derive(Debug, Error)]
pub enum PollError {
    /// A one-shot initial fetch failed.
    ///
    /// Fatal: nothing can be diffed without an initial snapshot.
    #[error("Initial fetch for change source '{source_name}' failed: {message}")]
    InitialFetch {
        /// The change source name.
        source_name: String,
        /// Description of the failure.
        message: String,
    },

    /// A remote listing could not be obtained this cycle.
    ///
    /// Transient inside a polling loop: logged, then retried next cycle.
    #[error("Change source '{source_name}' is unavailable: {message}")]
    Unavailable {
        /// The change source name.
        source_name: String,
        /// Description of the failure.
        message: String,
    },

    /// A remote response could not be parsed.
    #[error("Change source '{source_name}' returned an invalid response: {message}")]
    InvalidResponse {
        /// The change source name.
        source_name: String,
        /// Description of the parse failure.
        message: String,
    },
}

/// Result type alias for Converge operations.
pub type Result<T> = std::result::Result<T, ConvergeError>;

impl ConvergeError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this is the distinguished no-op outcome.
    #[must_use]
    pub const fn is_nothing_changed(&self) -> bool {
        matches!(self, Self::NothingChanged)
    }

    /// Maps the error kind to a process exit code.
    ///
    /// 0 is success, 255 the "nothing changed" no-op signal; every other
    /// kind gets its own code so automation can distinguish failures.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::NothingChanged => 255,
            Self::Config(_) => 3,
            Self::State(_) => 4,
            Self::Transport(_) => 5,
            Self::Provider(_) => 6,
            Self::Cloud(_) => 7,
            Self::Poll(_) => 8,
            Self::ResourceFailed { source, .. } => source.exit_code(),
            Self::Io(_) => 10,
            Self::Internal(_) => 1,
        }
    }
}

impl StateError {
    /// Creates a backend error with the given message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}

impl TransportError {
    /// Creates a transport IO error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

impl PollError {
    /// Creates a transient unavailability error.
    #[must_use]
    pub fn unavailable(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            source_name: source.into(),
            message: message.into(),
        }
    }
}
