//! Shared ownership and permission helpers for filesystem providers.

use crate::changelog::ResourceChange;
use crate::engine::Context;
use crate::error::{ProviderError, Result};

/// Resolves a declared owner to a uid.
///
/// A missing user is fatal, except under simulate where it degrades to a
/// logged warning so dry-runs always complete.
pub async fn resolve_owner(
    ctx: &Context,
    change: &mut ResourceChange,
    owner: Option<&str>,
) -> Result<Option<u32>> {
    let Some(name) = owner else {
        return Ok(None);
    };

    match ctx.transport.get_user(name).await? {
        Some(user) => Ok(Some(user.uid)),
        None if ctx.simulate => {
            change.notice(format!("User '{name}' does not exist"));
            Ok(None)
        }
        None => Err(ProviderError::InvalidUser {
            name: name.to_string(),
        }
        .into()),
    }
}

/// Resolves a declared group to a gid, degrading like [`resolve_owner`].
pub async fn resolve_group(
    ctx: &Context,
    change: &mut ResourceChange,
    group: Option<&str>,
) -> Result<Option<u32>> {
    let Some(name) = group else {
        return Ok(None);
    };

    match ctx.transport.get_group(name).await? {
        Some(group) => Ok(Some(group.gid)),
        None if ctx.simulate => {
            change.notice(format!("Group '{name}' does not exist"));
            Ok(None)
        }
        None => Err(ProviderError::InvalidGroup {
            name: name.to_string(),
        }
        .into()),
    }
}

/// Parses an octal permission string such as `"0644"`.
pub fn parse_mode(mode: &str) -> Result<u32> {
    u32::from_str_radix(mode, 8).map_err(|_| {
        ProviderError::InvalidAttribute {
            field: String::from("mode"),
            message: format!("'{mode}' is not an octal mode"),
        }
        .into()
    })
}

/// Reconciles owner, group and mode against the observed stat, one
/// independently reported change per attribute. Returns whether anything
/// changed.
pub async fn reconcile_metadata(
    ctx: &Context,
    change: &mut ResourceChange,
    path: &str,
    owner: Option<(&str, u32)>,
    group: Option<(&str, u32)>,
    mode: Option<u32>,
) -> Result<bool> {
    let mut changed = false;

    let stat = if ctx.transport.lexists(path).await {
        Some(ctx.transport.lstat(path).await?)
    } else {
        None
    };

    if let Some((name, uid)) = owner
        && stat.map(|s| s.uid) != Some(uid)
    {
        ctx.execute(change, &["chown", name, path]).await?;
        change.notice(format!("Changed owner to {name}"));
        changed = true;
    }

    if let Some((name, gid)) = group
        && stat.map(|s| s.gid) != Some(gid)
    {
        ctx.execute(change, &["chgrp", name, path]).await?;
        change.notice(format!("Changed group to {name}"));
        changed = true;
    }

    if let Some(bits) = mode
        && stat.map(|s| s.mode) != Some(bits)
    {
        let octal = format!("{bits:o}");
        ctx.execute(change, &["chmod", &octal, path]).await?;
        change.notice(format!("Changed mode to {octal}"));
        changed = true;
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("0644").expect("octal"), 0o644);
        assert_eq!(parse_mode("755").expect("octal"), 0o755);
        assert!(parse_mode("rw-r--r--").is_err());
    }
}
