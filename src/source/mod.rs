//! Change sources: pollers that watch external systems and invalidate
//! cached graph values.
//!
//! Each source runs as a cooperative task: it polls on an interval,
//! diffs the observation against its last snapshot, and commits the
//! snapshot update plus the resulting cache-busts as one atomic
//! changeset. Transient polling failures are logged and retried next
//! cycle; only the one-shot initial fetch is fatal.

mod changeset;
mod git;
mod hosted;

pub use changeset::{CacheBust, ChangeManager, Changeset};
pub use git::{GitChangeSource, DEFAULT_POLL_INTERVAL_SECS};
pub use hosted::HostedEventsSource;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::Result;

/// A long-running poller for one external system.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// The source name, used as the cache-bust scope.
    fn name(&self) -> &str;

    /// One-shot initial fetch seeding the snapshot.
    ///
    /// # Errors
    ///
    /// Fatal when the listing cannot be obtained: nothing can be diffed
    /// without an initial snapshot.
    async fn prime(&mut self) -> Result<()>;

    /// Validation-only hook run by `test`.
    async fn test(&self) -> Result<()> {
        Ok(())
    }

    /// Polls until `shutdown` flips. Per-cycle failures are logged and
    /// the loop continues; returning is reserved for shutdown.
    async fn run(
        &mut self,
        manager: ChangeManager,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()>;
}

/// Sleeps for `interval`, returning early with `true` when shutdown
/// flips.
pub(crate) async fn sleep_or_shutdown(
    interval: std::time::Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        () = tokio::time::sleep(interval) => false,
        _ = shutdown.changed() => true,
    }
}
