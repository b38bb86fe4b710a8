//! Desired-vs-observed record synchroniser.
//!
//! The generic three-way diff behind zone- and record-level DNS
//! synchronisation. Desired ("master") and observed ("slave") record sets
//! are keyed by a reconciliation id; [`Synchroniser::synchronise`] invokes
//! the writer's create/update/delete callbacks exactly once per divergent
//! id and reports whether anything changed.
//!
//! Attribute comparison is field-by-field over the master's declared
//! attribute set, so observed fields this engine does not manage never
//! force a spurious update.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;

/// Attribute set carried by a record.
pub type AttrMap = BTreeMap<String, serde_json::Value>;

/// A desired or observed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    /// Reconciliation id.
    pub id: String,
    /// Declared attributes.
    pub attrs: AttrMap,
}

/// Callbacks applying reconciliation decisions to the observed side.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordWriter: Send + Sync {
    /// Whether slave-only records may be destroyed. Record kinds that
    /// never delete observed state return false and slave-only ids are
    /// skipped entirely.
    fn deletes(&self) -> bool {
        true
    }

    /// Creates a record present only in the master set.
    async fn create(&self, record: &SyncRecord) -> Result<()>;

    /// Updates a record whose declared attributes diverged.
    async fn update(&self, record: &SyncRecord) -> Result<()>;

    /// Deletes a record present only in the slave set.
    async fn delete(&self, record: &SyncRecord) -> Result<()>;
}

/// Diff engine between a master and a slave record set.
#[derive(Debug, Default)]
pub struct Synchroniser {
    simulate: bool,
    master: Vec<SyncRecord>,
    slave: BTreeMap<String, SyncRecord>,
}

impl Synchroniser {
    /// Creates a synchroniser. In simulate mode the writer callbacks are
    /// replaced by log-only stand-ins; the changed/unchanged result is
    /// unaffected.
    #[must_use]
    pub fn new(simulate: bool) -> Self {
        Self {
            simulate,
            master: Vec::new(),
            slave: BTreeMap::new(),
        }
    }

    /// Adds a desired record.
    pub fn add_master(&mut self, id: impl Into<String>, attrs: AttrMap) {
        self.master.push(SyncRecord {
            id: id.into(),
            attrs,
        });
    }

    /// Adds an observed record.
    pub fn add_slave(&mut self, id: impl Into<String>, attrs: AttrMap) {
        let id = id.into();
        self.slave.insert(
            id.clone(),
            SyncRecord { id, attrs },
        );
    }

    /// Reconciles the two sets through the writer.
    ///
    /// Master-only ids invoke `create` exactly once each; shared ids with
    /// differing declared attributes invoke `update` exactly once each;
    /// slave-only ids invoke `delete` exactly once each, or are skipped
    /// when the writer does not delete.
    ///
    /// # Errors
    ///
    /// Propagates the first writer failure.
    pub async fn synchronise(&self, writer: &dyn RecordWriter) -> Result<bool> {
        let mut changed = false;

        for record in &self.master {
            match self.slave.get(&record.id) {
                None => {
                    changed = true;
                    if self.simulate {
                        info!(target: "simulation", "Would create record '{}'", record.id);
                    } else {
                        writer.create(record).await?;
                    }
                }
                Some(observed) => {
                    if Self::attrs_diverge(record, observed) {
                        changed = true;
                        if self.simulate {
                            info!(target: "simulation", "Would update record '{}'", record.id);
                        } else {
                            writer.update(record).await?;
                        }
                    }
                }
            }
        }

        if writer.deletes() {
            for (id, observed) in &self.slave {
                if !self.master.iter().any(|m| &m.id == id) {
                    changed = true;
                    if self.simulate {
                        info!(target: "simulation", "Would delete record '{}'", id);
                    } else {
                        writer.delete(observed).await?;
                    }
                }
            }
        }

        Ok(changed)
    }

    /// Field-by-field comparison over the master's declared keys only.
    fn attrs_diverge(master: &SyncRecord, slave: &SyncRecord) -> bool {
        master
            .attrs
            .iter()
            .any(|(key, value)| slave.attrs.get(key) != Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(pairs: &[(&str, serde_json::Value)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn writer_with(create: usize, update: usize, delete: usize) -> MockRecordWriter {
        let mut writer = MockRecordWriter::new();
        writer.expect_deletes().return_const(true);
        writer.expect_create().times(create).returning(|_| Ok(()));
        writer.expect_update().times(update).returning(|_| Ok(()));
        writer.expect_delete().times(delete).returning(|_| Ok(()));
        writer
    }

    #[tokio::test]
    async fn test_totality_over_disjoint_and_shared_ids() {
        let mut sync = Synchroniser::new(false);
        // Master-only: a. Shared differing: b. Shared identical: c.
        // Slave-only: d.
        sync.add_master("a", attrs(&[("data", json!("1"))]));
        sync.add_master("b", attrs(&[("data", json!("2"))]));
        sync.add_master("c", attrs(&[("data", json!("3"))]));
        sync.add_slave("b", attrs(&[("data", json!("old"))]));
        sync.add_slave("c", attrs(&[("data", json!("3"))]));
        sync.add_slave("d", attrs(&[("data", json!("4"))]));

        let writer = writer_with(1, 1, 1);
        let changed = sync.synchronise(&writer).await.expect("synchronise");
        assert!(changed);
    }

    #[tokio::test]
    async fn test_no_divergence_reports_unchanged() {
        let mut sync = Synchroniser::new(false);
        sync.add_master("a", attrs(&[("data", json!("1"))]));
        sync.add_slave("a", attrs(&[("data", json!("1"))]));

        let writer = writer_with(0, 0, 0);
        let changed = sync.synchronise(&writer).await.expect("synchronise");
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_delete_disabled_skips_slave_only_ids() {
        let mut sync = Synchroniser::new(false);
        sync.add_slave("orphan", attrs(&[("data", json!("x"))]));

        let mut writer = MockRecordWriter::new();
        writer.expect_deletes().return_const(false);
        writer.expect_create().times(0);
        writer.expect_update().times(0);
        writer.expect_delete().times(0);

        // Slave-only records are skipped entirely: no delete, no change.
        let changed = sync.synchronise(&writer).await.expect("synchronise");
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_unmanaged_observed_fields_never_force_update() {
        let mut sync = Synchroniser::new(false);
        sync.add_master("a", attrs(&[("data", json!("1"))]));
        // The observed record carries extra provider-side fields.
        sync.add_slave(
            "a",
            attrs(&[("data", json!("1")), ("provider_serial", json!(9000))]),
        );

        let writer = writer_with(0, 0, 0);
        let changed = sync.synchronise(&writer).await.expect("synchronise");
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_simulate_reports_changes_without_invoking_writer() {
        let mut sync = Synchroniser::new(true);
        sync.add_master("a", attrs(&[("data", json!("1"))]));
        sync.add_slave("b", attrs(&[("data", json!("2"))]));

        let mut writer = MockRecordWriter::new();
        writer.expect_deletes().return_const(true);
        writer.expect_create().times(0);
        writer.expect_update().times(0);
        writer.expect_delete().times(0);

        let changed = sync.synchronise(&writer).await.expect("synchronise");
        assert!(changed);
    }

    #[tokio::test]
    async fn test_writer_failure_propagates() {
        let mut sync = Synchroniser::new(false);
        sync.add_master("a", attrs(&[("data", json!("1"))]));

        let mut writer = MockRecordWriter::new();
        writer.expect_deletes().return_const(true);
        writer.expect_create().times(1).returning(|_| {
            Err(crate::error::CloudError::DriverFailed {
                message: String::from("boom"),
            }
            .into())
        });

        assert!(sync.synchronise(&writer).await.is_err());
    }
}
