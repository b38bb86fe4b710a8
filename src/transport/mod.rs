//! Transport capability for reaching the target environment.
//!
//! Providers are transport-agnostic: they consume the [`Transport`] trait
//! and never branch on local vs. remote. The trait covers the primitives
//! the providers actually need: command execution with captured output,
//! existence/symlink/stat queries, and user/group lookups.

mod local;

pub use local::LocalTransport;

use async_trait::async_trait;

use crate::error::Result;

/// Captured outcome of an executed command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit status code (-1 when terminated by a signal).
    pub status: i32,
}

impl CommandOutcome {
    /// Returns true if the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.status == 0
    }
}

/// Stat information for a filesystem entry, without following links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Permission bits.
    pub mode: u32,
}

/// A user account on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    /// Account name.
    pub name: String,
    /// Numeric user id.
    pub uid: u32,
}

/// A group on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    /// Group name.
    pub name: String,
    /// Numeric group id.
    pub gid: u32,
}

/// Capability contract for acting on a target environment.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes a command and captures stdout, stderr and exit status.
    ///
    /// A non-zero exit is not an error here; callers decide.
    async fn execute(&self, argv: &[String]) -> Result<CommandOutcome>;

    /// Returns true if the path exists, following symlinks.
    async fn exists(&self, path: &str) -> bool;

    /// Returns true if the path exists, not following symlinks.
    async fn lexists(&self, path: &str) -> bool;

    /// Returns true if the path is a symbolic link.
    async fn is_link(&self, path: &str) -> bool;

    /// Reads the destination of a symbolic link.
    async fn read_link(&self, path: &str) -> Result<String>;

    /// Stats a path without following symlinks.
    async fn lstat(&self, path: &str) -> Result<FileStat>;

    /// Looks up a user account. `Ok(None)` means the user does not exist.
    async fn get_user(&self, name: &str) -> Result<Option<UserEntry>>;

    /// Looks up a group. `Ok(None)` means the group does not exist.
    async fn get_group(&self, name: &str) -> Result<Option<GroupEntry>>;

    /// Whether the target filesystem supports symbolic links.
    ///
    /// Used as a provider applicability predicate at bind time.
    fn supports_symlinks(&self) -> bool {
        true
    }
}
