//! Read-only state wrapper for dry-run applies.
//!
//! Writes are captured in memory and never persisted; reads fall through
//! to the wrapped store unless a captured value exists, in which case the
//! captured value is returned.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

use super::store::PartStore;

/// Read-only wrapper capturing writes in memory.
pub struct SimulatedStateStore<S: PartStore> {
    inner: S,
    captured: BTreeMap<String, Value>,
}

impl<S: PartStore> SimulatedStateStore<S> {
    /// Wraps a store for a simulated run.
    #[must_use]
    pub fn new(inner: S) -> Self {
        debug!("Wrapping state store in read-only adaptor");
        Self {
            inner,
            captured: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl<S: PartStore> PartStore for SimulatedStateStore<S> {
    async fn part(&mut self, name: &str) -> Result<Value> {
        if let Some(value) = self.captured.get(name) {
            return Ok(value.clone());
        }
        self.inner.part(name).await
    }

    async fn set_part(&mut self, name: &str, value: Value) -> Result<()> {
        self.captured.insert(name.to_string(), value);
        Ok(())
    }

    async fn remove_part(&mut self, name: &str) -> Result<()> {
        self.captured.remove(name);
        Ok(())
    }

    async fn reset(&mut self) -> Result<()> {
        self.captured.clear();
        Ok(())
    }

    async fn parts(&mut self) -> Result<BTreeMap<String, Value>> {
        let mut all = self.inner.parts().await?;
        for (name, value) in &self.captured {
            all.insert(name.clone(), value.clone());
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::store::tests::MemoryBackend;
    use crate::state::store::StateStore;
    use serde_json::json;

    fn wrapped_store() -> SimulatedStateStore<StateStore> {
        SimulatedStateStore::new(StateStore::new(Box::new(MemoryBackend::with_content(
            r#"{"version": 2, "timestamp": "t", "parts": {"existing": {"hash": "h"}}}"#,
        ))))
    }

    #[tokio::test]
    async fn test_reads_fall_through() {
        let mut store = wrapped_store();
        let part = store.part("existing").await.expect("part");
        assert_eq!(part, json!({"hash": "h"}));
    }

    #[tokio::test]
    async fn test_write_is_captured_and_read_back() {
        let mut store = wrapped_store();
        store
            .set_part("new", json!({"hash": "n"}))
            .await
            .expect("set");

        // The captured value is what the next read returns.
        assert_eq!(store.part("new").await.expect("part"), json!({"hash": "n"}));
    }

    #[tokio::test]
    async fn test_capture_shadows_wrapped_value() {
        let mut store = wrapped_store();
        store
            .set_part("existing", json!({"hash": "updated"}))
            .await
            .expect("set");

        assert_eq!(
            store.part("existing").await.expect("part"),
            json!({"hash": "updated"})
        );
    }

    #[tokio::test]
    async fn test_nothing_persists() {
        let backend_content =
            r#"{"version": 2, "timestamp": "t", "parts": {}}"#;
        let mut store = SimulatedStateStore::new(StateStore::new(Box::new(
            MemoryBackend::with_content(backend_content),
        )));

        store.set_part("x", json!({"a": 1})).await.expect("set");

        // A fresh store over the same (unchanged) backend sees nothing.
        let mut fresh = StateStore::new(Box::new(MemoryBackend::with_content(backend_content)));
        assert_eq!(fresh.part("x").await.expect("part"), json!({}));
    }
}
