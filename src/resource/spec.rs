//! Resource declaration types.
//!
//! These structs map to the `resources:` entries of a bundle file. Each
//! resource is a typed, named desired-state declaration; identity is the
//! (type, name) pair and must be unique within a bundle.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cloud::DriverConfig;
use crate::error::ConfigError;

/// Behavior mode of a resource, selecting the eligible provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Converge the resource to its declared state.
    #[default]
    Apply,
    /// Remove the resource from the target.
    Remove,
    /// Ensure a service is running.
    Start,
    /// Ensure a service is stopped.
    Stop,
    /// Restart a service unconditionally.
    Restart,
}

impl Policy {
    /// The policy a `destroy` pass substitutes for this one.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::Apply => Self::Remove,
            Self::Start | Self::Restart => Self::Stop,
            Self::Remove | Self::Stop => self,
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Apply => "apply",
            Self::Remove => "remove",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        };
        write!(f, "{s}")
    }
}

/// Resource type discriminant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// A symbolic link.
    Link,
    /// A long-running service.
    Service,
    /// A DNS zone with its records.
    DnsZone,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::File => "File",
            Self::Directory => "Directory",
            Self::Link => "Link",
            Self::Service => "Service",
            Self::DnsZone => "DnsZone",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ResourceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "File" => Ok(Self::File),
            "Directory" => Ok(Self::Directory),
            "Link" => Ok(Self::Link),
            "Service" => Ok(Self::Service),
            "DnsZone" => Ok(Self::DnsZone),
            _ => Err(ConfigError::InvalidReference {
                reference: s.to_string(),
            }),
        }
    }
}

/// Declaration of a regular file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSpec {
    /// Absolute path of the file.
    pub name: String,
    /// Owning user name.
    #[serde(default)]
    pub owner: Option<String>,
    /// Owning group name.
    #[serde(default)]
    pub group: Option<String>,
    /// Octal permission string, e.g. `"0644"`.
    #[serde(default)]
    pub mode: Option<String>,
}

/// Declaration of a directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectorySpec {
    /// Absolute path of the directory.
    pub name: String,
    /// Owning user name.
    #[serde(default)]
    pub owner: Option<String>,
    /// Owning group name.
    #[serde(default)]
    pub group: Option<String>,
    /// Octal permission string, e.g. `"0755"`.
    #[serde(default)]
    pub mode: Option<String>,
}

/// Declaration of a symbolic link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSpec {
    /// Absolute path of the link itself.
    pub name: String,
    /// Destination the link points at. Optional for `remove` policy.
    #[serde(default)]
    pub to: Option<String>,
    /// Owning user name.
    #[serde(default)]
    pub owner: Option<String>,
    /// Owning group name.
    #[serde(default)]
    pub group: Option<String>,
}

/// Declaration of a long-running service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSpec {
    /// Service name.
    pub name: String,
    /// Command starting the service.
    #[serde(default)]
    pub start: Option<String>,
    /// Command stopping the service.
    #[serde(default)]
    pub stop: Option<String>,
    /// Command restarting the service.
    #[serde(default)]
    pub restart: Option<String>,
    /// Probe command; exit 0 means the service is running.
    #[serde(default)]
    pub running: Option<String>,
}

/// One DNS record inside a zone declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordSpec {
    /// Record name within the zone.
    pub name: String,
    /// Record type.
    #[serde(rename = "type", default = "default_record_type")]
    pub record_type: String,
    /// Record data.
    pub data: String,
    /// Provider-specific extras.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_record_type() -> String {
    String::from("A")
}

/// Declaration of a DNS zone and its managed records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneSpec {
    /// Zone domain name.
    pub domain: String,
    /// Driver selection and credentials.
    pub driver: DriverConfig,
    /// Zone type (`master` or `slave`).
    #[serde(default = "default_zone_type")]
    pub zone_type: String,
    /// Default TTL for the zone.
    #[serde(default)]
    pub ttl: u32,
    /// Provider-specific extras.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
    /// Managed records.
    #[serde(default)]
    pub records: Vec<RecordSpec>,
}

fn default_zone_type() -> String {
    String::from("master")
}

/// Typed attributes of a resource, tagged by `type:` in the bundle file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceKind {
    /// A regular file.
    File(FileSpec),
    /// A directory.
    Directory(DirectorySpec),
    /// A symbolic link.
    Link(LinkSpec),
    /// A long-running service.
    Service(ServiceSpec),
    /// A DNS zone.
    DnsZone(ZoneSpec),
}

/// A single desired-state declaration.
///
/// Immutable once the bundle is bound for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    /// Typed attributes.
    #[serde(flatten)]
    pub kind: ResourceKind,
    /// Behavior mode.
    #[serde(default)]
    pub policy: Policy,
    /// Dependency references in `Type[name]` form.
    #[serde(default)]
    pub requires: Vec<String>,
}

impl Resource {
    /// Returns the resource's type discriminant.
    #[must_use]
    pub const fn resource_type(&self) -> ResourceType {
        match &self.kind {
            ResourceKind::File(_) => ResourceType::File,
            ResourceKind::Directory(_) => ResourceType::Directory,
            ResourceKind::Link(_) => ResourceType::Link,
            ResourceKind::Service(_) => ResourceType::Service,
            ResourceKind::DnsZone(_) => ResourceType::DnsZone,
        }
    }

    /// Returns the resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.kind {
            ResourceKind::File(s) => &s.name,
            ResourceKind::Directory(s) => &s.name,
            ResourceKind::Link(s) => &s.name,
            ResourceKind::Service(s) => &s.name,
            ResourceKind::DnsZone(s) => &s.domain,
        }
    }

    /// Returns the `Type[name]` identity string.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}[{}]", self.resource_type(), self.name())
    }

    /// Returns a copy with the destroy-pass policy substituted.
    #[must_use]
    pub fn inverted(&self) -> Self {
        let mut resource = self.clone();
        resource.policy = self.policy.inverse();
        resource
    }
}

/// A parsed dependency reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// Referenced resource type.
    pub resource_type: ResourceType,
    /// Referenced resource name.
    pub name: String,
}

impl ResourceRef {
    /// Returns true if this reference points at the given resource.
    #[must_use]
    pub fn matches(&self, resource: &Resource) -> bool {
        self.resource_type == resource.resource_type() && self.name == resource.name()
    }
}

impl FromStr for ResourceRef {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidReference {
            reference: s.to_string(),
        };

        let open = s.find('[').ok_or_else(invalid)?;
        if !s.ends_with(']') || open == 0 || open + 2 > s.len() {
            return Err(invalid());
        }

        let resource_type = s[..open].parse()?;
        let name = s[open + 1..s.len() - 1].to_string();
        if name.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            resource_type,
            name,
        })
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.resource_type, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_link_resource() {
        let yaml = r"
type: link
name: /etc/somelink
to: /etc
owner: root
group: root
";
        let resource: Resource = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(resource.resource_type(), ResourceType::Link);
        assert_eq!(resource.name(), "/etc/somelink");
        assert_eq!(resource.policy, Policy::Apply);
        assert_eq!(resource.id(), "Link[/etc/somelink]");
    }

    #[test]
    fn test_parse_remove_policy() {
        let yaml = r"
type: link
name: /etc/toremovelink
policy: remove
";
        let resource: Resource = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(resource.policy, Policy::Remove);
    }

    #[test]
    fn test_parse_requires() {
        let yaml = r#"
type: file
name: /frob/somedir/foo
requires: ["Directory[/etc/somedir]"]
"#;
        let resource: Resource = serde_yaml::from_str(yaml).expect("parse");
        let reference: ResourceRef = resource.requires[0].parse().expect("reference");
        assert_eq!(reference.resource_type, ResourceType::Directory);
        assert_eq!(reference.name, "/etc/somedir");
    }

    #[test]
    fn test_invalid_reference() {
        assert!("Directory".parse::<ResourceRef>().is_err());
        assert!("Directory[]".parse::<ResourceRef>().is_err());
        assert!("[name]".parse::<ResourceRef>().is_err());
        assert!("Frobnicator[/x]".parse::<ResourceRef>().is_err());
    }

    #[test]
    fn test_policy_inverse() {
        assert_eq!(Policy::Apply.inverse(), Policy::Remove);
        assert_eq!(Policy::Start.inverse(), Policy::Stop);
        assert_eq!(Policy::Restart.inverse(), Policy::Stop);
        assert_eq!(Policy::Remove.inverse(), Policy::Remove);
    }

    #[test]
    fn test_parse_zone() {
        let yaml = r"
type: dns_zone
domain: example.com
driver:
  id: ROUTE53
  key: abc
  secret: def
ttl: 60
records:
  - name: www
    data: 192.168.1.1
";
        let resource: Resource = serde_yaml::from_str(yaml).expect("parse");
        let ResourceKind::DnsZone(zone) = &resource.kind else {
            panic!("expected a zone");
        };
        assert_eq!(zone.driver.id, "ROUTE53");
        assert_eq!(zone.zone_type, "master");
        assert_eq!(zone.records[0].record_type, "A");
    }
}
