//! Service providers.
//!
//! A service declares `start`/`stop`/`restart` command lines and an
//! optional `running` probe whose exit status decides whether the service
//! is up. Restart is deliberately never idempotent: every apply restarts.

use async_trait::async_trait;

use crate::changelog::ResourceChange;
use crate::engine::Context;
use crate::error::{ConvergeError, ProviderError, Result};
use crate::resource::{Policy, Resource, ResourceKind, ResourceType, ServiceSpec};

use super::Provider;

fn service_spec(resource: &Resource) -> Result<&ServiceSpec> {
    match &resource.kind {
        ResourceKind::Service(spec) => Ok(spec),
        _ => Err(ConvergeError::internal(format!(
            "Service provider bound to {}",
            resource.id()
        ))),
    }
}

/// Runs the `running` probe, if declared. `None` means no probe.
async fn probe_running(ctx: &Context, spec: &ServiceSpec) -> Result<Option<bool>> {
    let Some(probe) = spec.running.as_deref() else {
        return Ok(None);
    };

    let argv = vec![
        String::from("/bin/sh"),
        String::from("-c"),
        probe.to_string(),
    ];
    let outcome = ctx.transport.execute(&argv).await?;
    Ok(Some(outcome.success()))
}

/// Ensures a service is running. Also serves the default `apply` policy,
/// matching the conventional meaning of converging a service.
pub struct ServiceStart;

const START_POLICIES: &[Policy] = &[Policy::Apply, Policy::Start];
const STOP_POLICIES: &[Policy] = &[Policy::Stop];
const RESTART_POLICIES: &[Policy] = &[Policy::Restart];

#[async_trait]
impl Provider for ServiceStart {
    fn name(&self) -> &'static str {
        "service-start"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Service
    }

    fn policies(&self) -> &'static [Policy] {
        START_POLICIES
    }

    async fn apply(
        &self,
        ctx: &Context,
        resource: &Resource,
        change: &mut ResourceChange,
    ) -> Result<bool> {
        let spec = service_spec(resource)?;

        if probe_running(ctx, spec).await? == Some(true) {
            return Ok(false);
        }

        let start = spec.start.as_deref().ok_or_else(|| {
            ProviderError::InvalidProvider {
                resource: resource.id(),
                message: String::from("no start command declared"),
            }
        })?;

        ctx.execute(change, &["/bin/sh", "-c", start]).await?;
        change.notice(format!("Started service {}", spec.name));
        Ok(true)
    }
}

/// Ensures a service is stopped.
pub struct ServiceStop;

#[async_trait]
impl Provider for ServiceStop {
    fn name(&self) -> &'static str {
        "service-stop"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Service
    }

    fn policies(&self) -> &'static [Policy] {
        STOP_POLICIES
    }

    async fn apply(
        &self,
        ctx: &Context,
        resource: &Resource,
        change: &mut ResourceChange,
    ) -> Result<bool> {
        let spec = service_spec(resource)?;

        if probe_running(ctx, spec).await? == Some(false) {
            return Ok(false);
        }

        let Some(stop) = spec.stop.as_deref() else {
            // Nothing declared to stop with; nothing to do.
            return Ok(false);
        };

        ctx.execute(change, &["/bin/sh", "-c", stop]).await?;
        change.notice(format!("Stopped service {}", spec.name));
        Ok(true)
    }
}

/// Restarts a service every time configuration is applied.
pub struct ServiceRestart;

#[async_trait]
impl Provider for ServiceRestart {
    fn name(&self) -> &'static str {
        "service-restart"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Service
    }

    fn policies(&self) -> &'static [Policy] {
        RESTART_POLICIES
    }

    async fn apply(
        &self,
        ctx: &Context,
        resource: &Resource,
        change: &mut ResourceChange,
    ) -> Result<bool> {
        let spec = service_spec(resource)?;

        let restart = spec.restart.as_deref().ok_or_else(|| {
            ProviderError::InvalidProvider {
                resource: resource.id(),
                message: String::from("no restart command declared"),
            }
        })?;

        ctx.execute(change, &["/bin/sh", "-c", restart]).await?;
        change.notice(format!("Restarted service {}", spec.name));
        Ok(true)
    }
}
