//! The per-run resource bundle and its dependency graph.
//!
//! A bundle exclusively owns its resources for one run. `bind()`
//! validates every dependency reference, rejects duplicate identities and
//! cycles, produces a deterministic topological order (ties broken by
//! declaration order) and selects the unique provider for every
//! resource's policy.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::engine::Context;
use crate::error::{ConfigError, Result};
use crate::provider::{Provider, ProviderRegistry};

use super::spec::{Resource, ResourceRef};

/// The full set of resources for one run.
#[derive(Debug, Clone, Default)]
pub struct ResourceBundle {
    resources: Vec<Resource>,
}

impl ResourceBundle {
    /// Creates a bundle from declared resources, in declaration order.
    #[must_use]
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    /// Returns true if the bundle declares no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Number of declared resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Iterates the declared resources in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    /// Returns the bundle a destroy pass operates on: same resources with
    /// each policy replaced by its inverse.
    #[must_use]
    pub fn for_destroy(&self) -> Self {
        Self {
            resources: self.resources.iter().map(Resource::inverted).collect(),
        }
    }

    /// Validates the bundle and binds providers.
    ///
    /// # Errors
    ///
    /// Fails on duplicate identities, unresolvable or malformed
    /// dependency references, dependency cycles, and zero or multiple
    /// provider matches. All are fatal before any mutation.
    pub fn bind(self, registry: &ProviderRegistry, ctx: &Context) -> Result<BoundBundle> {
        let mut seen: HashSet<String> = HashSet::new();
        for resource in &self.resources {
            if !seen.insert(resource.id()) {
                return Err(ConfigError::DuplicateResource {
                    type_name: resource.resource_type().to_string(),
                    name: resource.name().to_string(),
                }
                .into());
            }
        }

        // Resolve Type[name] references to indices within the bundle.
        let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(self.resources.len());
        for resource in &self.resources {
            let mut edges = Vec::new();
            for raw in &resource.requires {
                let reference: ResourceRef = raw.parse()?;
                let target = self
                    .resources
                    .iter()
                    .position(|candidate| reference.matches(candidate))
                    .ok_or_else(|| ConfigError::UnresolvedDependency {
                        resource: resource.id(),
                        reference: raw.clone(),
                    })?;
                edges.push(target);
            }
            dependencies.push(edges);
        }

        let order = self.topological_order(&dependencies)?;

        let providers = self
            .resources
            .iter()
            .map(|resource| registry.select(resource, ctx))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Bound {} resources: {:?}",
            self.resources.len(),
            order
                .iter()
                .map(|&i| self.resources[i].id())
                .collect::<Vec<_>>()
        );

        Ok(BoundBundle {
            resources: self.resources,
            order,
            providers,
        })
    }

    /// Kahn's algorithm with the ready set kept ordered by declaration
    /// index, so the order is deterministic and ties resolve in
    /// declaration order.
    fn topological_order(&self, dependencies: &[Vec<usize>]) -> Result<Vec<usize>> {
        let count = self.resources.len();
        let mut in_degree = vec![0usize; count];
        let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();

        for (index, edges) in dependencies.iter().enumerate() {
            in_degree[index] = edges.len();
            for &dependency in edges {
                dependents.entry(dependency).or_default().push(index);
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(index, _)| index)
            .collect();

        let mut order = Vec::with_capacity(count);
        while let Some(&index) = ready.iter().next() {
            ready.remove(&index);
            order.push(index);

            if let Some(children) = dependents.get(&index) {
                for &child in children {
                    in_degree[child] -= 1;
                    if in_degree[child] == 0 {
                        ready.insert(child);
                    }
                }
            }
        }

        if order.len() != count {
            let stuck: Vec<String> = (0..count)
                .filter(|index| !order.contains(index))
                .map(|index| self.resources[index].id())
                .collect();
            return Err(ConfigError::DependencyCycle {
                cycle: stuck.join(" -> "),
            }
            .into());
        }

        Ok(order)
    }
}

impl From<Vec<Resource>> for ResourceBundle {
    fn from(resources: Vec<Resource>) -> Self {
        Self::new(resources)
    }
}

/// A validated bundle with execution order and selected providers.
pub struct BoundBundle {
    resources: Vec<Resource>,
    order: Vec<usize>,
    providers: Vec<Arc<dyn Provider>>,
}

impl std::fmt::Debug for BoundBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundBundle")
            .field("resources", &self.resources.len())
            .field("order", &self.order)
            .finish()
    }
}

impl BoundBundle {
    /// The resources, indexed as declared.
    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Indices in execution order.
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// The provider bound to the resource at `index`.
    #[must_use]
    pub fn provider(&self, index: usize) -> &Arc<dyn Provider> {
        &self.providers[index]
    }

    /// Iterates `(resource, provider)` pairs in execution order.
    pub fn in_order(&self) -> impl Iterator<Item = (&Resource, &Arc<dyn Provider>)> {
        self.order
            .iter()
            .map(|&index| (&self.resources[index], &self.providers[index]))
    }

    /// Iterates `(resource, provider)` pairs in reverse execution order,
    /// as used by destroy passes.
    pub fn in_reverse_order(&self) -> impl Iterator<Item = (&Resource, &Arc<dyn Provider>)> {
        self.order
            .iter()
            .rev()
            .map(|&index| (&self.resources[index], &self.providers[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::test_context;
    use crate::provider::test_support::recording_registry;
    use crate::resource::spec::{DirectorySpec, FileSpec, Policy, ResourceKind};

    fn directory(name: &str) -> Resource {
        Resource {
            kind: ResourceKind::Directory(DirectorySpec {
                name: name.to_string(),
                owner: None,
                group: None,
                mode: None,
            }),
            policy: Policy::Apply,
            requires: vec![],
        }
    }

    fn file_requiring(name: &str, requires: &[&str]) -> Resource {
        Resource {
            kind: ResourceKind::File(FileSpec {
                name: name.to_string(),
                owner: None,
                group: None,
                mode: None,
            }),
            policy: Policy::Apply,
            requires: requires.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_deterministic_order_with_declaration_tiebreak() {
        let bundle = ResourceBundle::new(vec![
            file_requiring("/a", &["Directory[/d]"]),
            directory("/b"),
            directory("/d"),
        ]);

        let (registry, _log) = recording_registry();
        let ctx = test_context();
        let bound = bundle.bind(&registry, &ctx).expect("bind");

        // /b is ready first (declared before /d); /a waits for /d.
        assert_eq!(bound.order(), &[1, 2, 0]);
    }

    #[test]
    fn test_cycle_is_fatal() {
        let bundle = ResourceBundle::new(vec![
            file_requiring("/a", &["File[/b]"]),
            file_requiring("/b", &["File[/a]"]),
        ]);

        let (registry, _log) = recording_registry();
        let ctx = test_context();
        let err = bundle.bind(&registry, &ctx).expect_err("cycle");
        assert!(matches!(
            err,
            crate::error::ConvergeError::Config(ConfigError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn test_unresolved_dependency_is_fatal() {
        let bundle = ResourceBundle::new(vec![file_requiring("/a", &["Directory[/missing]"])]);

        let (registry, _log) = recording_registry();
        let ctx = test_context();
        let err = bundle.bind(&registry, &ctx).expect_err("unresolved");
        assert!(matches!(
            err,
            crate::error::ConvergeError::Config(ConfigError::UnresolvedDependency { .. })
        ));
    }

    #[test]
    fn test_duplicate_identity_is_fatal() {
        let bundle = ResourceBundle::new(vec![directory("/same"), directory("/same")]);

        let (registry, _log) = recording_registry();
        let ctx = test_context();
        let err = bundle.bind(&registry, &ctx).expect_err("duplicate");
        assert!(matches!(
            err,
            crate::error::ConvergeError::Config(ConfigError::DuplicateResource { .. })
        ));
    }

    #[test]
    fn test_same_name_different_type_is_allowed() {
        let bundle = ResourceBundle::new(vec![directory("/same"), file_requiring("/same", &[])]);

        let (registry, _log) = recording_registry();
        let ctx = test_context();
        assert!(bundle.bind(&registry, &ctx).is_ok());
    }

    #[test]
    fn test_for_destroy_inverts_policies() {
        let bundle = ResourceBundle::new(vec![directory("/d")]);
        let destroy = bundle.for_destroy();
        assert_eq!(destroy.iter().next().expect("resource").policy, Policy::Remove);
    }
}
