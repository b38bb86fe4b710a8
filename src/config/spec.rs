//! Bundle file schema.

use serde::{Deserialize, Serialize};

use crate::resource::Resource;

/// The root structure of a `Convergefile.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleFile {
    /// Cluster identifier; keys the remote state object.
    pub cluster: String,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Resource declarations, in declaration order.
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Change source declarations for watch mode.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// State backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StateConfig {
    /// Backend type.
    #[serde(default)]
    pub backend: StateBackendKind,
    /// Local state directory (local backend).
    #[serde(default)]
    pub path: Option<String>,
    /// Object storage bucket (cloud backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// Object key prefix (cloud backend).
    #[serde(default)]
    pub prefix: Option<String>,
    /// Storage region (cloud backend).
    #[serde(default)]
    pub region: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackendKind {
    /// Local single-file storage.
    #[default]
    Local,
    /// Remote object storage keyed by the cluster identifier.
    Cloud,
}

/// Kinds of change sources.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Poll a git remote's refs.
    Git,
    /// Poll a hosted repository's events feed.
    Hosted,
}

/// Declaration of one change source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    /// Source kind.
    pub kind: SourceKind,
    /// Source name; scopes its cache-busts.
    pub name: String,
    /// Repository to watch: a git URL, or `owner/repo` for hosted feeds.
    pub repository: String,
    /// Seconds between poll cycles.
    #[serde(rename = "polling-interval", default = "default_polling_interval")]
    pub polling_interval: u64,
    /// API endpoint override for hosted feeds.
    #[serde(default)]
    pub api_base: Option<String>,
}

const fn default_polling_interval() -> u64 {
    crate::source::DEFAULT_POLL_INTERVAL_SECS
}

impl BundleFile {
    /// Total number of declared resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}
