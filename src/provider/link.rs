//! Symbolic link providers.

use async_trait::async_trait;

use crate::changelog::ResourceChange;
use crate::engine::Context;
use crate::error::{ConvergeError, ProviderError, Result};
use crate::resource::{LinkSpec, Policy, Resource, ResourceKind, ResourceType};

use super::meta::{resolve_group, resolve_owner};
use super::Provider;

fn link_spec(resource: &Resource) -> Result<&LinkSpec> {
    match &resource.kind {
        ResourceKind::Link(spec) => Ok(spec),
        _ => Err(ConvergeError::internal(format!(
            "Link provider bound to {}",
            resource.id()
        ))),
    }
}

/// Converges a symlink: destination, then owner and group, each an
/// independently reported change.
pub struct LinkApply;

const APPLY_POLICIES: &[Policy] = &[Policy::Apply];
const REMOVE_POLICIES: &[Policy] = &[Policy::Remove];

#[async_trait]
impl Provider for LinkApply {
    fn name(&self) -> &'static str {
        "link-apply"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Link
    }

    fn policies(&self) -> &'static [Policy] {
        APPLY_POLICIES
    }

    fn is_valid(&self, _resource: &Resource, ctx: &Context) -> bool {
        ctx.transport.supports_symlinks()
    }

    async fn apply(
        &self,
        ctx: &Context,
        resource: &Resource,
        change: &mut ResourceChange,
    ) -> Result<bool> {
        let spec = link_spec(resource)?;
        let name = spec.name.as_str();
        let to = spec.to.as_deref().ok_or_else(|| {
            ProviderError::InvalidAttribute {
                field: String::from("to"),
                message: String::from("a link needs a destination"),
            }
        })?;

        let mut changed = false;

        if !ctx.transport.exists(to).await {
            if !ctx.simulate {
                return Err(ProviderError::DanglingSymlink {
                    path: to.to_string(),
                }
                .into());
            }
            change.notice(format!("Destination of symlink {to} does not exist"));
        }

        let owner = resolve_owner(ctx, change, spec.owner.as_deref()).await?;
        let group = resolve_group(ctx, change, spec.group.as_deref()).await?;

        let points_at = if ctx.transport.is_link(name).await {
            ctx.transport.read_link(name).await.ok()
        } else {
            None
        };

        if points_at.as_deref() != Some(to) {
            if ctx.transport.lexists(name).await {
                ctx.execute(change, &["rm", "-rf", name]).await?;
            }
            ctx.execute(change, &["ln", "-s", to, name]).await?;
            change.notice(format!("Created symlink {name} -> {to}"));
            changed = true;
        }

        let is_link_now = ctx.transport.is_link(name).await;
        if !is_link_now && !ctx.simulate {
            return Err(ProviderError::OperationFailed {
                message: String::from("Did not create expected symbolic link"),
            }
            .into());
        }

        let stat = if is_link_now {
            Some(ctx.transport.lstat(name).await?)
        } else {
            None
        };

        if let Some(uid) = owner
            && stat.map(|s| s.uid) != Some(uid)
        {
            let owner_name = spec.owner.as_deref().unwrap_or_default();
            ctx.execute(change, &["chown", "-h", owner_name, name]).await?;
            change.notice(format!("Changed owner to {owner_name}"));
            changed = true;
        }

        if let Some(gid) = group
            && stat.map(|s| s.gid) != Some(gid)
        {
            let group_name = spec.group.as_deref().unwrap_or_default();
            ctx.execute(change, &["chgrp", "-h", group_name, name]).await?;
            change.notice(format!("Changed group to {group_name}"));
            changed = true;
        }

        Ok(changed)
    }
}

/// Removes a symlink. Refuses to delete anything that is not a link.
pub struct LinkRemove;

#[async_trait]
impl Provider for LinkRemove {
    fn name(&self) -> &'static str {
        "link-remove"
    }

    fn resource_type(&self) -> ResourceType {
        ResourceType::Link
    }

    fn policies(&self) -> &'static [Policy] {
        REMOVE_POLICIES
    }

    fn is_valid(&self, _resource: &Resource, ctx: &Context) -> bool {
        ctx.transport.supports_symlinks()
    }

    async fn apply(
        &self,
        ctx: &Context,
        resource: &Resource,
        change: &mut ResourceChange,
    ) -> Result<bool> {
        let spec = link_spec(resource)?;
        let name = spec.name.as_str();

        if !ctx.transport.lexists(name).await {
            return Ok(false);
        }

        if !ctx.transport.is_link(name).await {
            return Err(ProviderError::InvalidProvider {
                resource: resource.id(),
                message: format!("{name} exists and is not a link"),
            }
            .into());
        }

        ctx.execute(change, &["rm", name]).await?;
        change.notice(format!("Removed symlink {name}"));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{test_context, test_context_with};
    use crate::engine::RunOptions;

    fn link_resource(name: &str, to: &str) -> Resource {
        Resource {
            kind: ResourceKind::Link(LinkSpec {
                name: name.to_string(),
                to: Some(to.to_string()),
                owner: None,
                group: None,
            }),
            policy: Policy::Apply,
            requires: vec![],
        }
    }

    fn remove_resource(name: &str) -> Resource {
        Resource {
            kind: ResourceKind::Link(LinkSpec {
                name: name.to_string(),
                to: None,
                owner: None,
                group: None,
            }),
            policy: Policy::Remove,
            requires: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_then_converged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("target");
        std::fs::create_dir(&target).expect("mkdir");
        let link = dir.path().join("somelink");

        let resource = link_resource(&link.to_string_lossy(), &target.to_string_lossy());
        let ctx = test_context();
        let provider = LinkApply;

        // First apply creates the link.
        let mut change = ctx.changelog.resource(resource.id());
        let changed = provider
            .apply(&ctx, &resource, &mut change)
            .await
            .expect("apply");
        drop(change);
        assert!(changed);
        assert!(link.is_symlink());

        // Second apply with identical inputs changes nothing.
        let mut change = ctx.changelog.resource(resource.id());
        let changed = provider
            .apply(&ctx, &resource, &mut change)
            .await
            .expect("apply");
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_existing_non_link_is_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("foo");
        std::fs::write(&target, b"").expect("write");
        let path = dir.path().join("bar_notalink");
        std::fs::write(&path, b"").expect("write");

        let resource = link_resource(&path.to_string_lossy(), &target.to_string_lossy());
        let ctx = test_context();

        let mut change = ctx.changelog.resource(resource.id());
        let changed = LinkApply
            .apply(&ctx, &resource, &mut change)
            .await
            .expect("apply");
        assert!(changed);
        assert_eq!(
            std::fs::read_link(&path).expect("read_link"),
            target
        );
    }

    #[tokio::test]
    async fn test_link_pointing_elsewhere_is_repointed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let old = dir.path().join("baz");
        let new = dir.path().join("foo");
        std::fs::write(&old, b"").expect("write");
        std::fs::write(&new, b"").expect("write");
        let path = dir.path().join("bar_elsewhere");
        std::os::unix::fs::symlink(&old, &path).expect("symlink");

        let resource = link_resource(&path.to_string_lossy(), &new.to_string_lossy());
        let ctx = test_context();

        let mut change = ctx.changelog.resource(resource.id());
        let changed = LinkApply
            .apply(&ctx, &resource, &mut change)
            .await
            .expect("apply");
        assert!(changed);
        assert_eq!(std::fs::read_link(&path).expect("read_link"), new);
    }

    #[tokio::test]
    async fn test_dangling_destination_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resource = link_resource(
            &dir.path().join("l").to_string_lossy(),
            &dir.path().join("not_there").to_string_lossy(),
        );
        let ctx = test_context();

        let mut change = ctx.changelog.resource(resource.id());
        let err = LinkApply
            .apply(&ctx, &resource, &mut change)
            .await
            .expect_err("dangling");
        assert!(matches!(
            err,
            ConvergeError::Provider(ProviderError::DanglingSymlink { .. })
        ));
    }

    #[tokio::test]
    async fn test_dangling_destination_degrades_under_simulate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = dir.path().join("l");
        let resource = link_resource(
            &link.to_string_lossy(),
            &dir.path().join("not_there").to_string_lossy(),
        );
        let ctx = test_context_with(RunOptions {
            simulate: true,
            ..RunOptions::default()
        });

        let mut change = ctx.changelog.resource(resource.id());
        let changed = LinkApply
            .apply(&ctx, &resource, &mut change)
            .await
            .expect("dry-run completes");

        // The intended change is still reported; nothing was mutated.
        assert!(changed);
        assert!(!link.exists());
    }

    #[tokio::test]
    async fn test_remove_refuses_non_link() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("regular");
        std::fs::write(&path, b"data").expect("write");

        let resource = remove_resource(&path.to_string_lossy());
        let ctx = test_context();

        let mut change = ctx.changelog.resource(resource.id());
        let err = LinkRemove
            .apply(&ctx, &resource, &mut change)
            .await
            .expect_err("not a link");
        assert!(matches!(
            err,
            ConvergeError::Provider(ProviderError::InvalidProvider { .. })
        ));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_remove_deletes_link() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("toremovelink");
        std::os::unix::fs::symlink("/", &path).expect("symlink");

        let resource = remove_resource(&path.to_string_lossy());
        let ctx = test_context();

        let mut change = ctx.changelog.resource(resource.id());
        let changed = LinkRemove
            .apply(&ctx, &resource, &mut change)
            .await
            .expect("remove");
        assert!(changed);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_remove_absent_is_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resource = remove_resource(&dir.path().join("absent").to_string_lossy());
        let ctx = test_context();

        let mut change = ctx.changelog.resource(resource.id());
        let changed = LinkRemove
            .apply(&ctx, &resource, &mut change)
            .await
            .expect("remove");
        assert!(!changed);
    }
}
