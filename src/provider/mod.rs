//! Providers: policy-specific logic making reality match a declaration.
//!
//! A provider is polymorphic over (resource type, policy), stateless
//! across calls, and consumes the run [`Context`] plus a bound
//! [`Resource`]. It returns whether anything changed; "nothing changed"
//! is a normal outcome, not an error.

mod directory;
mod dns;
mod file;
mod link;
mod meta;
mod registry;
mod service;

pub use directory::{DirectoryApply, DirectoryRemove};
pub use dns::{ZoneApply, ZoneRemove};
pub use file::{FileApply, FileRemove};
pub use link::{LinkApply, LinkRemove};
pub use registry::ProviderRegistry;
pub use service::{ServiceRestart, ServiceStart, ServiceStop};

use async_trait::async_trait;

use crate::changelog::ResourceChange;
use crate::engine::Context;
use crate::error::Result;
use crate::resource::{Policy, Resource, ResourceType};

/// Policy-specific convergence logic for one resource type.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name, for diagnostics.
    fn name(&self) -> &'static str;

    /// The resource type this provider serves.
    fn resource_type(&self) -> ResourceType;

    /// The policies this provider satisfies.
    fn policies(&self) -> &'static [Policy];

    /// Applicability predicate over (resource, context), evaluated at
    /// bind time alongside the policy match.
    fn is_valid(&self, _resource: &Resource, _ctx: &Context) -> bool {
        true
    }

    /// Validation-only hook: existence and credential checks, never
    /// mutation. Runs over every resource before an apply/destroy pass.
    async fn test(&self, _ctx: &Context, _resource: &Resource) -> Result<()> {
        Ok(())
    }

    /// Converges the resource, recording into the change scope.
    ///
    /// Returns true when anything changed. Under simulate the provider
    /// must not mutate target state yet still reports the changes it
    /// would make.
    async fn apply(
        &self,
        ctx: &Context,
        resource: &Resource,
        change: &mut ResourceChange,
    ) -> Result<bool>;
}
