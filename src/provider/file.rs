//! Regular file providers.

use async_trait::async_trait;

use crate::changelog::ResourceChange;
use crate::engine::Context;
use crate::error::{ConvergeError, ProviderError, Result};
use crate::resource::{FileSpec, Policy, Resource, ResourceKind, ResourceType};

use super::meta::{parse_mode, reconcile_metadata, resolve_group, resolve_owner};
use super::Provider;

fn file_spec(resource: &Resource) -> Result<&FileSpec> {
    match &resource.kind {
        ResourceKind::File(spec) => Ok(spec),
        _ => Err(ConvergeError::internal(format!(
            "File provider bound to {}",
            resource.id()
        ))),
    }
}

fn parent_of(path: &str) -> Option<&str> {
    std::path::Path::new(path)
        .parent()
        .and_then(|p| p.to_str())
        .filter(|p| !p.is_empty())
}

const APPLY_POLICIES: &[Policy] = &[Policy::Apply];
const REMOVE_POLICIES: &[Policy] = &[Policy::Remove];

/// Ensures a file exists with the declared owner, group and mode.
pub struct FileApply;

#[async_trait]
impl Provider for FileApply {
    fn name(&self) -> &'static str {
        "file-apply"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::File
    }

    fn policies(&self) -> &'static [Policy] {
        APPLY_POLICIES
    }

    async fn apply(
        &self,
        ctx: &Context,
        resource: &Resource,
        change: &mut ResourceChange,
    ) -> Result<bool> {
        let spec = file_spec(resource)?;
        let name = spec.name.as_str();
        let mut changed = false;

        if let Some(parent) = parent_of(name)
            && !ctx.transport.exists(parent).await
        {
            if !ctx.simulate {
                return Err(ProviderError::MissingPathComponent {
                    path: parent.to_string(),
                }
                .into());
            }
            change.notice(format!("Path component {parent} does not exist"));
        }

        let owner_uid = resolve_owner(ctx, change, spec.owner.as_deref()).await?;
        let group_gid = resolve_group(ctx, change, spec.group.as_deref()).await?;
        let mode = spec.mode.as_deref().map(parse_mode).transpose()?;

        if !ctx.transport.exists(name).await {
            ctx.execute(change, &["touch", name]).await?;
            change.notice(format!("Created file {name}"));
            changed = true;
        }

        let owner = spec
            .owner
            .as_deref()
            .zip(owner_uid);
        let group = spec
            .group
            .as_deref()
            .zip(group_gid);

        changed |= reconcile_metadata(ctx, change, name, owner, group, mode).await?;

        Ok(changed)
    }
}

/// Removes a file if present.
pub struct FileRemove;

#[async_trait]
impl Provider for FileRemove {
    fn name(&self) -> &'static str {
        "file-remove"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::File
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
        let spec = file_spec(resource)?;
        let name = spec.name.as_str();

        if !ctx.transport.lexists(name).await {
            return Ok(false);
        }

        ctx.execute(change, &["rm", name]).await?;
        change.notice(format!("Removed file {name}"));
        Ok(true)
    }
}
