//! Explicit provider registry.
//!
//! Providers are registered at initialization time, before any run
//! starts. At bind time the engine selects, per resource, the unique
//! provider whose declared policies include the resource's policy and
//! whose applicability predicate holds. Zero or multiple matches is a
//! fatal configuration error.

use std::sync::Arc;

use crate::engine::Context;
use crate::error::{ConfigError, Result};
use crate::resource::Resource;

use super::{
    DirectoryApply, DirectoryRemove, FileApply, FileRemove, LinkApply, LinkRemove, Provider,
    ServiceRestart, ServiceStart, ServiceStop, ZoneApply, ZoneRemove,
};

/// Registry mapping (resource type, policy) to providers.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the registry of built-in providers.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FileApply));
        registry.register(Arc::new(FileRemove));
        registry.register(Arc::new(DirectoryApply));
        registry.register(Arc::new(DirectoryRemove));
        registry.register(Arc::new(LinkApply));
        registry.register(Arc::new(LinkRemove));
        registry.register(Arc::new(ServiceStart));
        registry.register(Arc::new(ServiceStop));
        registry.register(Arc::new(ServiceRestart));
        registry.register(Arc::new(ZoneApply));
        registry.register(Arc::new(ZoneRemove));
        registry
    }

    /// Registers a provider.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.push(provider);
    }

    /// Selects the unique provider for a resource's policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoProvider`] when nothing matches and
    /// [`ConfigError::AmbiguousProvider`] when more than one does.
    pub fn select(&self, resource: &Resource, ctx: &Context) -> Result<Arc<dyn Provider>> {
        let matches: Vec<&Arc<dyn Provider>> = self
            .providers
            .iter()
            .filter(|provider| {
                provider.resource_type() == resource.resource_type()
                    && provider.policies().contains(&resource.policy)
                    && provider.is_valid(resource, ctx)
            })
            .collect();

        match matches.as_slice() {
            [provider] => Ok(Arc::clone(provider)),
            [] => Err(ConfigError::NoProvider {
                resource: resource.id(),
                policy: resource.policy.to_string(),
            }
            .into()),
            _ => Err(ConfigError::AmbiguousProvider {
                resource: resource.id(),
                policy: resource.policy.to_string(),
                count: matches.len(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::test_context;
    use crate::resource::{FileSpec, LinkSpec, Policy, ResourceKind};

    fn file(policy: Policy) -> Resource {
        Resource {
            kind: ResourceKind::File(FileSpec {
                name: String::from("/etc/somefile"),
                owner: None,
                group: None,
                mode: None,
            }),
            policy,
            requires: vec![],
        }
    }

    #[test]
    fn test_selects_unique_provider() {
        let registry = ProviderRegistry::builtin();
        let ctx = test_context();

        let provider = registry.select(&file(Policy::Apply), &ctx).expect("select");
        assert_eq!(provider.name(), "file-apply");

        let provider = registry.select(&file(Policy::Remove), &ctx).expect("select");
        assert_eq!(provider.name(), "file-remove");
    }

    #[test]
    fn test_no_match_is_fatal() {
        let registry = ProviderRegistry::builtin();
        let ctx = test_context();

        // Files have no start policy.
        let err = registry
            .select(&file(Policy::Start), &ctx)
            .map(drop)
            .expect_err("no provider");
        assert!(matches!(
            err,
            crate::error::ConvergeError::Config(ConfigError::NoProvider { .. })
        ));
    }

    #[test]
    fn test_ambiguous_match_is_fatal() {
        let mut registry = ProviderRegistry::builtin();
        // A second apply provider for files makes selection ambiguous.
        registry.register(std::sync::Arc::new(FileApply));
        let ctx = test_context();

        let err = registry
            .select(&file(Policy::Apply), &ctx)
            .map(drop)
            .expect_err("ambiguous");
        assert!(matches!(
            err,
            crate::error::ConvergeError::Config(ConfigError::AmbiguousProvider { count: 2, .. })
        ));
    }

    #[test]
    fn test_link_selection_respects_transport_capability() {
        let registry = ProviderRegistry::builtin();
        let ctx = test_context();

        let link = Resource {
            kind: ResourceKind::Link(LinkSpec {
                name: String::from("/etc/somelink"),
                to: Some(String::from("/etc")),
                owner: None,
                group: None,
            }),
            policy: Policy::Apply,
            requires: vec![],
        };

        // The local transport supports symlinks, so selection succeeds.
        assert!(registry.select(&link, &ctx).is_ok());
    }
}
