//! DNS zone providers.
//!
//! A zone declaration is converged in two levels through the generic
//! synchroniser: the zone itself first, then its records. Zone-level
//! synchronisation never deletes observed zones; record-level
//! synchronisation does delete records this engine manages.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::changelog::ResourceChange;
use crate::cloud::{DnsDriver, RecordInfo, ZoneInfo};
use crate::engine::Context;
use crate::error::{ConvergeError, Result};
use crate::reconciler::{AttrMap, RecordWriter, SyncRecord, Synchroniser};
use crate::resource::{Policy, Resource, ResourceKind, ResourceType, ZoneSpec};

use super::Provider;

fn zone_spec(resource: &Resource) -> Result<&ZoneSpec> {
    match &resource.kind {
        ResourceKind::DnsZone(spec) => Ok(spec),
        _ => Err(ConvergeError::internal(format!(
            "Zone provider bound to {}",
            resource.id()
        ))),
    }
}

/// Canonical zone domain: always one trailing dot.
fn canonical_domain(domain: &str) -> String {
    format!("{}.", domain.trim_end_matches('.'))
}

fn extra_to_json(extra: &BTreeMap<String, serde_json::Value>) -> serde_json::Value {
    serde_json::Value::Object(extra.clone().into_iter().collect())
}

fn json_to_extra(value: Option<&serde_json::Value>) -> BTreeMap<String, serde_json::Value> {
    value
        .and_then(|v| v.as_object())
        .map(|o| o.clone().into_iter().collect())
        .unwrap_or_default()
}

fn zone_attrs(domain: &str, zone_type: &str, ttl: u32, extra: &BTreeMap<String, serde_json::Value>) -> AttrMap {
    let mut attrs = AttrMap::new();
    attrs.insert(String::from("domain"), json!(domain));
    attrs.insert(String::from("type"), json!(zone_type));
    attrs.insert(String::from("ttl"), json!(ttl));
    attrs.insert(String::from("extra"), extra_to_json(extra));
    attrs
}

fn record_attrs(name: &str, record_type: &str, data: &str, extra: &BTreeMap<String, serde_json::Value>) -> AttrMap {
    let mut attrs = AttrMap::new();
    attrs.insert(String::from("name"), json!(name));
    attrs.insert(String::from("type"), json!(record_type));
    attrs.insert(String::from("data"), json!(data));
    attrs.insert(String::from("extra"), extra_to_json(extra));
    attrs
}

fn zone_info_from(record: &SyncRecord) -> ZoneInfo {
    ZoneInfo {
        domain: record
            .attrs
            .get("domain")
            .and_then(|v| v.as_str())
            .unwrap_or(&record.id)
            .to_string(),
        zone_type: record
            .attrs
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("master")
            .to_string(),
        ttl: record
            .attrs
            .get("ttl")
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0),
        extra: json_to_extra(record.attrs.get("extra")),
    }
}

fn record_info_from(record: &SyncRecord) -> RecordInfo {
    RecordInfo {
        name: record.id.clone(),
        record_type: record
            .attrs
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("A")
            .to_string(),
        data: record
            .attrs
            .get("data")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        extra: json_to_extra(record.attrs.get("extra")),
    }
}

/// Zone-level writer: creates and updates zones, never deletes them.
struct ZoneWriter {
    driver: Arc<dyn DnsDriver>,
}

#[async_trait]
impl RecordWriter for ZoneWriter {
    fn deletes(&self) -> bool {
        false
    }

    async fn create(&self, record: &SyncRecord) -> Result<()> {
        self.driver.create_zone(&zone_info_from(record)).await
    }

    async fn update(&self, record: &SyncRecord) -> Result<()> {
        self.driver.update_zone(&zone_info_from(record)).await
    }

    async fn delete(&self, _record: &SyncRecord) -> Result<()> {
        // Zones are never destroyed; the synchroniser never gets here.
        Ok(())
    }
}

/// Record-level writer: full create/update/delete against one zone.
struct RecordsWriter {
    driver: Arc<dyn DnsDriver>,
    domain: String,
}

#[async_trait]
impl RecordWriter for RecordsWriter {
    async fn create(&self, record: &SyncRecord) -> Result<()> {
        self.driver
            .create_record(&self.domain, &record_info_from(record))
            .await
    }

    async fn update(&self, record: &SyncRecord) -> Result<()> {
        self.driver
            .update_record(&self.domain, &record_info_from(record))
            .await
    }

    async fn delete(&self, record: &SyncRecord) -> Result<()> {
        self.driver
            .delete_record(&self.domain, &record_info_from(record))
            .await
    }
}

const APPLY_POLICIES: &[Policy] = &[Policy::Apply];
const REMOVE_POLICIES: &[Policy] = &[Policy::Remove];

/// Converges a DNS zone and its managed records.
pub struct ZoneApply;

impl ZoneApply {
    async fn synchronise_zone(
        ctx: &Context,
        driver: &Arc<dyn DnsDriver>,
        spec: &ZoneSpec,
        domain: &str,
    ) -> Result<(bool, bool)> {
        let mut sync = Synchroniser::new(ctx.simulate);
        sync.add_master(
            domain,
            zone_attrs(domain, &spec.zone_type, spec.ttl, &spec.extra),
        );

        let mut zone_exists = false;
        for zone in driver.list_zones().await? {
            if zone.domain == domain {
                zone_exists = true;
                sync.add_slave(
                    domain,
                    zone_attrs(&zone.domain, &zone.zone_type, zone.ttl, &zone.extra),
                );
            }
        }

        let writer = ZoneWriter {
            driver: Arc::clone(driver),
        };
        let changed = sync.synchronise(&writer).await?;
        Ok((changed, zone_exists))
    }

    async fn synchronise_records(
        ctx: &Context,
        driver: &Arc<dyn DnsDriver>,
        spec: &ZoneSpec,
        domain: &str,
        zone_exists: bool,
    ) -> Result<bool> {
        let mut sync = Synchroniser::new(ctx.simulate);

        for record in &spec.records {
            sync.add_master(
                record.name.clone(),
                record_attrs(&record.name, &record.record_type, &record.data, &record.extra),
            );
        }

        // A zone that does not exist yet has no observable records.
        if zone_exists {
            for record in driver.list_records(domain).await? {
                sync.add_slave(
                    record.name.clone(),
                    record_attrs(&record.name, &record.record_type, &record.data, &record.extra),
                );
            }
        }

        let writer = RecordsWriter {
            driver: Arc::clone(driver),
            domain: domain.to_string(),
        };
        sync.synchronise(&writer).await
    }
}

#[async_trait]
impl Provider for ZoneApply {
    fn name(&self) -> &'static str {
        "zone-apply"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::DnsZone
    }

    fn policies(&self) -> &'static [Policy] {
        APPLY_POLICIES
    }

    async fn test(&self, ctx: &Context, resource: &Resource) -> Result<()> {
        // Credential check: the driver must be constructible from the
        // declared configuration.
        let spec = zone_spec(resource)?;
        ctx.dns_driver(&spec.driver).await.map(|_| ())
    }

    async fn apply(
        &self,
        ctx: &Context,
        resource: &Resource,
        change: &mut ResourceChange,
    ) -> Result<bool> {
        let spec = zone_spec(resource)?;
        let domain = canonical_domain(&spec.domain);
        let driver = ctx.dns_driver(&spec.driver).await?;

        let (zone_changed, zone_exists) =
            Self::synchronise_zone(ctx, &driver, spec, &domain).await?;
        if zone_changed {
            change.notice(format!("Synchronised zone {domain}"));
        }

        let records_changed =
            Self::synchronise_records(ctx, &driver, spec, &domain, zone_exists).await?;
        if records_changed {
            change.notice(format!("Synchronised records for {domain}"));
        }

        Ok(zone_changed || records_changed)
    }
}

/// Destroy counterpart: deletes the records this engine manages but never
/// the zone itself.
pub struct ZoneRemove;

#[async_trait]
impl Provider for ZoneRemove {
    fn name(&self) -> &'static str {
        "zone-remove"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::DnsZone
    }

    fn policies(&self) -> &'static [Policy] {
        REMOVE_POLICIES
    }

    async fn apply(
        &self,
        ctx: &Context,
        resource: &Resource,
        change: &mut ResourceChange,
    ) -> Result<bool> {
        let spec = zone_spec(resource)?;
        let domain = canonical_domain(&spec.domain);
        let driver = ctx.dns_driver(&spec.driver).await?;

        let zone_exists = driver
            .list_zones()
            .await?
            .iter()
            .any(|zone| zone.domain == domain);
        if !zone_exists {
            return Ok(false);
        }

        // Empty master set plus managed observed records: the
        // synchroniser deletes each one exactly once.
        let mut sync = Synchroniser::new(ctx.simulate);
        for record in driver.list_records(&domain).await? {
            let managed = spec.records.iter().any(|declared| declared.name == record.name);
            if managed {
                sync.add_slave(
                    record.name.clone(),
                    record_attrs(&record.name, &record.record_type, &record.data, &record.extra),
                );
            }
        }

        let writer = RecordsWriter {
            driver,
            domain: domain.clone(),
        };
        let changed = sync.synchronise(&writer).await?;
        if changed {
            change.notice(format!("Removed managed records from {domain}"));
        }
        Ok(changed)
    }
}
