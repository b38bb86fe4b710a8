//! Cloud driver contracts.
//!
//! DNS state lives behind the [`DnsDriver`] primitive contract:
//! list/create/update zones and list/create/update/delete records.
//! Drivers are addressed by an opaque provider id plus credentials
//! supplied as configuration; concrete SDK bindings live outside this
//! crate and register factories in a [`DnsDriverRegistry`] before any run
//! starts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ConfigMap;
use crate::error::{CloudError, Result};

/// Driver selection and credentials from a resource declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriverConfig {
    /// Opaque provider id (e.g. `ROUTE53`).
    pub id: String,
    /// Credential and endpoint parameters, read through [`ConfigMap`].
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl DriverConfig {
    /// Typed access to the driver parameters.
    #[must_use]
    pub fn values(&self) -> ConfigMap<'_> {
        ConfigMap::new("driver", &self.params)
    }
}

/// A DNS zone as seen by a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneInfo {
    /// Fully-qualified domain, with trailing dot.
    pub domain: String,
    /// Zone type (`master` or `slave`).
    pub zone_type: String,
    /// Default TTL for the zone.
    pub ttl: u32,
    /// Provider-specific extras.
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A DNS record as seen by a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    /// Record name within the zone.
    pub name: String,
    /// Record type (`A`, `CNAME`, ...).
    pub record_type: String,
    /// Record data.
    pub data: String,
    /// Provider-specific extras.
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Primitive contract for DNS providers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DnsDriver: Send + Sync {
    /// Lists all zones visible to the credentials.
    async fn list_zones(&self) -> Result<Vec<ZoneInfo>>;

    /// Creates a zone.
    async fn create_zone(&self, zone: &ZoneInfo) -> Result<()>;

    /// Updates a zone in place.
    async fn update_zone(&self, zone: &ZoneInfo) -> Result<()>;

    /// Lists records within a zone.
    async fn list_records(&self, domain: &str) -> Result<Vec<RecordInfo>>;

    /// Creates a record in a zone.
    async fn create_record(&self, domain: &str, record: &RecordInfo) -> Result<()>;

    /// Updates a record in place.
    async fn update_record(&self, domain: &str, record: &RecordInfo) -> Result<()>;

    /// Deletes a record from a zone.
    async fn delete_record(&self, domain: &str, record: &RecordInfo) -> Result<()>;
}

/// Factory constructing a driver from static configuration.
pub type DnsDriverFactory =
    Arc<dyn Fn(&DriverConfig) -> Result<Arc<dyn DnsDriver>> + Send + Sync>;

/// Explicit registry from driver id to factory.
///
/// Populated at initialization time, before any run starts; an id with no
/// registered factory is a fatal configuration error.
#[derive(Default, Clone)]
pub struct DnsDriverRegistry {
    factories: HashMap<String, DnsDriverFactory>,
}

impl std::fmt::Debug for DnsDriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsDriverRegistry")
            .field("drivers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DnsDriverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a driver id.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        factory: impl Fn(&DriverConfig) -> Result<Arc<dyn DnsDriver>> + Send + Sync + 'static,
    ) {
        self.factories.insert(id.into(), Arc::new(factory));
    }

    /// Builds a driver from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError::UnknownDriver`] when no factory is registered
    /// for the configured id, or whatever the factory itself reports.
    pub fn build(&self, config: &DriverConfig) -> Result<Arc<dyn DnsDriver>> {
        let factory = self.factories.get(&config.id).ok_or_else(|| {
            CloudError::UnknownDriver {
                id: config.id.clone(),
            }
        })?;
        factory(config)
    }
}
