//! Versioned part-state store over a pluggable backend.
//!
//! The store is loaded lazily and memoized until the first mutation;
//! every committed change persists the whole envelope immediately
//! (write-through, no batching). Loading requires a recognized envelope
//! version; an absent or unsupported version is a fatal, non-recoverable
//! read error that never partially populates the store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ConvergeError, Result, StateError};

/// Current envelope version. Only this version has a loader.
pub const STATE_VERSION: u64 = 2;

/// Raw persistence for the serialized envelope.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Reads the persisted envelope, or `None` when none exists yet.
    async fn read(&self) -> Result<Option<String>>;

    /// Persists the serialized envelope.
    async fn write(&self, content: &str) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

/// Read/write access to named part blobs, shared by the apply engine and
/// the change-source machinery.
#[async_trait]
pub trait PartStore: Send {
    /// Returns the blob for a part, or an empty mapping if absent.
    async fn part(&mut self, name: &str) -> Result<Value>;

    /// Stores a part blob, persisting write-through.
    async fn set_part(&mut self, name: &str, value: Value) -> Result<()>;

    /// Removes a part blob, persisting write-through.
    async fn remove_part(&mut self, name: &str) -> Result<()>;

    /// Discards all persisted parts.
    async fn reset(&mut self) -> Result<()>;

    /// Returns all parts, for status reporting.
    async fn parts(&mut self) -> Result<BTreeMap<String, Value>>;
}

/// Shared handle to a part store.
///
/// The cooperative single-threaded scheduler already serializes access;
/// the mutex is the explicit guard that keeps a migration to OS-level
/// parallelism sound.
pub type SharedState = Arc<tokio::sync::Mutex<Box<dyn PartStore>>>;

/// The versioned state store.
pub struct StateStore {
    backend: Box<dyn StateBackend>,
    parts: Option<BTreeMap<String, Value>>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("backend", &self.backend.backend_type())
            .field("loaded", &self.parts.is_some())
            .finish()
    }
}

impl StateStore {
    /// Creates a store over the given backend. Nothing is read until the
    /// first access.
    #[must_use]
    pub fn new(backend: Box<dyn StateBackend>) -> Self {
        Self {
            backend,
            parts: None,
        }
    }

    /// Wraps the store in a shared handle.
    #[must_use]
    pub fn into_shared(self) -> SharedState {
        Arc::new(tokio::sync::Mutex::new(Box::new(self)))
    }

    /// Loads and memoizes the envelope. Subsequent calls are no-ops until
    /// the in-memory copy is discarded.
    async fn load(&mut self) -> Result<()> {
        if self.parts.is_some() {
            return Ok(());
        }

        let Some(content) = self.backend.read().await? else {
            debug!("No persisted state; starting empty");
            self.parts = Some(BTreeMap::new());
            return Ok(());
        };

        let envelope: Value = serde_json::from_str(&content)
            .map_err(|e| StateError::corrupted(format!("Failed to parse state file: {e}")))?;

        let version = envelope.get("version").and_then(Value::as_u64);
        let parts = match version {
            Some(STATE_VERSION) => Self::load_v2(&envelope)?,
            found => return Err(StateError::UnsupportedVersion { found }.into()),
        };

        self.parts = Some(parts);
        Ok(())
    }

    /// Loader for envelope version 2.
    fn load_v2(envelope: &Value) -> Result<BTreeMap<String, Value>> {
        let parts = envelope
            .get("parts")
            .cloned()
            .unwrap_or_else(|| json!({}));

        serde_json::from_value(parts)
            .map_err(|e| StateError::corrupted(format!("Invalid parts mapping: {e}")).into())
    }

    /// Like `load`, but a missing remote object starts an empty store so
    /// the first write can create it.
    async fn load_for_write(&mut self) -> Result<()> {
        match self.load().await {
            Ok(()) => Ok(()),
            Err(ConvergeError::State(StateError::RemoteMissing { .. })) => {
                debug!("Remote state missing; seeding empty envelope for first write");
                self.parts = Some(BTreeMap::new());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn persist(&mut self) -> Result<()> {
        let parts = self.parts.as_ref().map_or_else(BTreeMap::new, Clone::clone);
        let envelope = json!({
            "version": STATE_VERSION,
            "timestamp": Utc::now().to_rfc3339(),
            "parts": parts,
        });

        let content = serde_json::to_string_pretty(&envelope)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        self.backend.write(&content).await
    }
}

#[async_trait]
impl PartStore for StateStore {
    async fn part(&mut self, name: &str) -> Result<Value> {
        self.load().await?;
        Ok(self
            .parts
            .as_ref()
            .and_then(|p| p.get(name))
            .cloned()
            .unwrap_or_else(|| json!({})))
    }

    async fn set_part(&mut self, name: &str, value: Value) -> Result<()> {
        self.load_for_write().await?;
        if let Some(parts) = self.parts.as_mut() {
            parts.insert(name.to_string(), value);
        }
        self.persist().await
    }

    async fn remove_part(&mut self, name: &str) -> Result<()> {
        self.load_for_write().await?;
        let removed = self
            .parts
            .as_mut()
            .is_some_and(|parts| parts.remove(name).is_some());
        if removed {
            self.persist().await?;
        }
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.parts = Some(BTreeMap::new());
        self.persist().await
    }

    async fn parts(&mut self) -> Result<BTreeMap<String, Value>> {
        self.load().await?;
        Ok(self.parts.clone().unwrap_or_default())
    }
}
