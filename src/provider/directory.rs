//! Directory providers.

use async_trait::async_trait;

use crate::changelog::ResourceChange;
use crate::engine::Context;
use crate::error::{ConvergeError, ProviderError, Result};
use crate::resource::{DirectorySpec, Policy, Resource, ResourceKind, ResourceType};

use super::meta::{parse_mode, reconcile_metadata, resolve_group, resolve_owner};
use super::Provider;

fn directory_spec(resource: &Resource) -> Result<&DirectorySpec> {
    match &resource.kind {
        ResourceKind::Directory(spec) => Ok(spec),
        _ => Err(ConvergeError::internal(format!(
            "Directory provider bound to {}",
            resource.id()
        ))),
    }
}

const APPLY_POLICIES: &[Policy] = &[Policy::Apply];
const REMOVE_POLICIES: &[Policy] = &[Policy::Remove];

/// Ensures a directory exists with the declared owner, group and mode.
///
/// The parent must already exist; intermediate components are resources
/// of their own, which keeps a failed run resumable at the exact
/// component that was missing.
pub struct DirectoryApply;

#[async_trait]
impl Provider for DirectoryApply {
    fn name(&self) -> &'static str {
        "directory-apply"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Directory
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
        let spec = directory_spec(resource)?;
        let name = spec.name.as_str();
        let mut changed = false;

        if let Some(parent) = std::path::Path::new(name)
            .parent()
            .and_then(|p| p.to_str())
            .filter(|p| !p.is_empty())
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
            ctx.execute(change, &["mkdir", name]).await?;
            change.notice(format!("Created directory {name}"));
            changed = true;
        }

        let owner = spec.owner.as_deref().zip(owner_uid);
        let group = spec.group.as_deref().zip(group_gid);

        changed |= reconcile_metadata(ctx, change, name, owner, group, mode).await?;

        Ok(changed)
    }
}

/// Removes a directory and its contents if present.
pub struct DirectoryRemove;

#[async_trait]
impl Provider for DirectoryRemove {
    fn name(&self) -> &'static str {
        "directory-remove"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Directory
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
        let spec = directory_spec(resource)?;
        let name = spec.name.as_str();

        if !ctx.transport.exists(name).await {
            return Ok(false);
        }

        ctx.execute(change, &["rm", "-rf", name]).await?;
        change.notice(format!("Removed directory {name}"));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::test_context;

    fn directory_resource(name: &str, policy: Policy) -> Resource {
        Resource {
            kind: ResourceKind::Directory(DirectorySpec {
                name: name.to_string(),
                owner: None,
                group: None,
                mode: None,
            }),
            policy,
            requires: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_then_converged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wibble");
        let resource = directory_resource(&path.to_string_lossy(), Policy::Apply);
        let ctx = test_context();

        let mut change = ctx.changelog.resource(resource.id());
        assert!(DirectoryApply
            .apply(&ctx, &resource, &mut change)
            .await
            .expect("apply"));
        drop(change);
        assert!(path.is_dir());

        let mut change = ctx.changelog.resource(resource.id());
        assert!(!DirectoryApply
            .apply(&ctx, &resource, &mut change)
            .await
            .expect("apply"));
    }

    #[tokio::test]
    async fn test_missing_parent_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frob/somedir");
        let resource = directory_resource(&path.to_string_lossy(), Policy::Apply);
        let ctx = test_context();

        let mut change = ctx.changelog.resource(resource.id());
        let err = DirectoryApply
            .apply(&ctx, &resource, &mut change)
            .await
            .expect_err("parent missing");
        assert!(matches!(
            err,
            ConvergeError::Provider(ProviderError::MissingPathComponent { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_recursive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("full");
        std::fs::create_dir(&path).expect("mkdir");
        std::fs::write(path.join("inner"), b"x").expect("write");

        let resource = directory_resource(&path.to_string_lossy(), Policy::Remove);
        let ctx = test_context();

        let mut change = ctx.changelog.resource(resource.id());
        assert!(DirectoryRemove
            .apply(&ctx, &resource, &mut change)
            .await
            .expect("remove"));
        drop(change);
        assert!(!path.exists());
    }
}
