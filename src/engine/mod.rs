//! The apply engine.
//!
//! Walks a bound bundle strictly sequentially in topological order,
//! dispatching each resource's provider inside a change-log scope and
//! recording convergence state write-through after every success, so an
//! aborted run can resume without re-running what already converged.

mod context;
mod watch;

pub use context::{Context, RunOptions};
pub use watch::run_watch;

#[cfg(test)]
pub use context::test_support;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{ConvergeError, Result};
use crate::provider::ProviderRegistry;
use crate::resource::{BoundBundle, Resource, ResourceBundle, SpecHasher};

/// The engine applying one bound bundle.
#[derive(Debug)]
pub struct ApplyEngine {
    bound: BoundBundle,
    hasher: SpecHasher,
}

impl ApplyEngine {
    /// Binds the bundle and creates the engine.
    ///
    /// # Errors
    ///
    /// Propagates bind-time configuration errors; all are fatal before
    /// any mutation.
    pub fn new(bundle: ResourceBundle, registry: &ProviderRegistry, ctx: &Context) -> Result<Self> {
        Ok(Self {
            bound: bundle.bind(registry, ctx)?,
            hasher: SpecHasher::new(),
        })
    }

    /// The bound bundle.
    #[must_use]
    pub const fn bound(&self) -> &BoundBundle {
        &self.bound
    }

    /// Runs every provider's validation hook, without mutation.
    ///
    /// Must complete successfully before any apply or destroy pass.
    ///
    /// # Errors
    ///
    /// Propagates the first failing validation.
    pub async fn test(&self, ctx: &Context) -> Result<()> {
        for (resource, provider) in self.bound.in_order() {
            debug!("Testing {}", resource.id());
            provider.test(ctx, resource).await?;
        }
        Ok(())
    }

    /// Applies the bundle. Returns whether anything changed.
    ///
    /// Resources already marked converged in persisted state are skipped
    /// when resuming; a provider reporting "nothing changed" is a normal
    /// outcome. The first provider error aborts the run immediately with
    /// the failing resource named; progress so far is already persisted.
    ///
    /// # Errors
    ///
    /// Returns [`ConvergeError::ResourceFailed`] wrapping the failing
    /// resource's error, or state-store failures.
    pub async fn apply(&self, ctx: &Context) -> Result<bool> {
        if ctx.no_resume {
            info!("Discarding persisted convergence marks");
            ctx.state.lock().await.reset().await?;
        }

        let mut any_changed = false;

        for (resource, provider) in self.bound.in_order() {
            let id = resource.id();
            let hash = self.hasher.hash_resource(resource)?;

            if ctx.resume && self.already_converged(ctx, &id, &hash).await? {
                debug!("Skipping {id}: already converged");
                continue;
            }

            let changed = self.converge_one(ctx, resource, provider.as_ref()).await?;
            any_changed |= changed;

            ctx.state
                .lock()
                .await
                .set_part(
                    &id,
                    json!({"hash": hash, "converged": true, "changed": changed}),
                )
                .await?;
        }

        Ok(any_changed)
    }

    /// Destroys the bundle in reverse topological order. The engine must
    /// have been built from [`ResourceBundle::for_destroy`].
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ApplyEngine::apply`].
    pub async fn destroy(&self, ctx: &Context) -> Result<bool> {
        let mut any_changed = false;

        for (resource, provider) in self.bound.in_reverse_order() {
            let id = resource.id();
            let changed = self.converge_one(ctx, resource, provider.as_ref()).await?;
            any_changed |= changed;

            ctx.state.lock().await.remove_part(&id).await?;
        }

        Ok(any_changed)
    }

    async fn already_converged(&self, ctx: &Context, id: &str, hash: &str) -> Result<bool> {
        let part = ctx.state.lock().await.part(id).await?;
        let converged = part
            .get("converged")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let same_declaration = part.get("hash").and_then(Value::as_str) == Some(hash);
        Ok(converged && same_declaration)
    }

    async fn converge_one(
        &self,
        ctx: &Context,
        resource: &Resource,
        provider: &dyn crate::provider::Provider,
    ) -> Result<bool> {
        let id = resource.id();
        info!("Converging {id} via {}", provider.name());

        let mut change = ctx.changelog.resource(&id);
        let outcome = provider.apply(ctx, resource, &mut change).await;
        // Flush the scope before recording or aborting.
        drop(change);

        outcome.map_err(|e| ConvergeError::ResourceFailed {
            resource: id,
            source: Box::new(e),
        })
    }
}
