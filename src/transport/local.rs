//! Local execution transport.
//!
//! Runs commands and filesystem queries directly on the machine Converge
//! is invoked on. User and group lookups go through `getent` so the same
//! code path works against NSS-backed databases, exactly as a remote
//! shell transport would resolve them.

use async_trait::async_trait;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::process::Stdio;
use tokio::process::Command;
use tracing::trace;

use crate::error::{Result, TransportError};

use super::{CommandOutcome, FileStat, GroupEntry, Transport, UserEntry};

/// Transport executing against the local machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTransport;

impl LocalTransport {
    /// Creates a new local transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    async fn getent(&self, database: &str, key: &str) -> Result<Option<Vec<String>>> {
        let argv = vec![
            String::from("getent"),
            database.to_string(),
            key.to_string(),
        ];
        let outcome = self.execute(&argv).await?;

        // getent exits 2 when the key is not present in the database.
        if !outcome.success() {
            return Ok(None);
        }

        let fields: Vec<String> = outcome
            .stdout
            .trim_end()
            .split(':')
            .map(String::from)
            .collect();
        Ok(Some(fields))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn execute(&self, argv: &[String]) -> Result<CommandOutcome> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            TransportError::io("Cannot execute an empty command line")
        })?;

        trace!("Executing: {}", argv.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| TransportError::io(format!("Failed to spawn `{program}`: {e}")))?;

        Ok(CommandOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        })
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }

    async fn lexists(&self, path: &str) -> bool {
        tokio::fs::symlink_metadata(path).await.is_ok()
    }

    async fn is_link(&self, path: &str) -> bool {
        tokio::fs::symlink_metadata(path)
            .await
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    async fn read_link(&self, path: &str) -> Result<String> {
        let target = tokio::fs::read_link(path)
            .await
            .map_err(|e| TransportError::io(format!("Failed to read link {path}: {e}")))?;
        Ok(target.to_string_lossy().into_owned())
    }

    async fn lstat(&self, path: &str) -> Result<FileStat> {
        let metadata = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| TransportError::io(format!("Failed to stat {path}: {e}")))?;

        Ok(FileStat {
            uid: metadata.uid(),
            gid: metadata.gid(),
            mode: metadata.permissions().mode() & 0o7777,
        })
    }

    async fn get_user(&self, name: &str) -> Result<Option<UserEntry>> {
        let Some(fields) = self.getent("passwd", name).await? else {
            return Ok(None);
        };

        // passwd format: name:passwd:uid:gid:gecos:dir:shell
        let uid = fields
            .get(2)
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| TransportError::io(format!("Unparseable passwd entry for {name}")))?;

        Ok(Some(UserEntry {
            name: name.to_string(),
            uid,
        }))
    }

    async fn get_group(&self, name: &str) -> Result<Option<GroupEntry>> {
        let Some(fields) = self.getent("group", name).await? else {
            return Ok(None);
        };

        // group format: name:passwd:gid:members
        let gid = fields
            .get(2)
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| TransportError::io(format!("Unparseable group entry for {name}")))?;

        Ok(Some(GroupEntry {
            name: name.to_string(),
            gid,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_captures_output() {
        let transport = LocalTransport::new();
        let outcome = transport
            .execute(&[String::from("echo"), String::from("hello")])
            .await
            .expect("echo should run");

        assert!(outcome.success());
        assert_eq!(outcome.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_execute_nonzero_is_not_an_error() {
        let transport = LocalTransport::new();
        let outcome = transport
            .execute(&[String::from("false")])
            .await
            .expect("false should spawn");

        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let transport = LocalTransport::new();
        assert!(transport.execute(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_symlink_queries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        tokio::fs::write(&target, b"x").await.expect("write");
        tokio::fs::symlink(&target, &link).await.expect("symlink");

        let transport = LocalTransport::new();
        let link_str = link.to_string_lossy().into_owned();

        assert!(transport.lexists(&link_str).await);
        assert!(transport.is_link(&link_str).await);
        assert_eq!(
            transport.read_link(&link_str).await.expect("read_link"),
            target.to_string_lossy()
        );
    }

    #[tokio::test]
    async fn test_lexists_sees_dangling_link() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = dir.path().join("dangling");
        tokio::fs::symlink(dir.path().join("missing"), &link)
            .await
            .expect("symlink");

        let transport = LocalTransport::new();
        let link_str = link.to_string_lossy().into_owned();

        assert!(!transport.exists(&link_str).await);
        assert!(transport.lexists(&link_str).await);
    }

    #[tokio::test]
    async fn test_get_user_root() {
        let transport = LocalTransport::new();
        let user = transport.get_user("root").await.expect("lookup");
        assert_eq!(user.map(|u| u.uid), Some(0));
    }

    #[tokio::test]
    async fn test_get_user_missing() {
        let transport = LocalTransport::new();
        let user = transport
            .get_user("no-such-user-converge-test")
            .await
            .expect("lookup");
        assert!(user.is_none());
    }
}
