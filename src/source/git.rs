//! Repository-ref change source.
//!
//! Lists the remote's refs on an interval, parses them into
//! `{branch -> revision}` plus a tag list, and diffs against the last
//! snapshot. A branch busts its key only when it existed before the cycle
//! and its revision changed; new branches have nothing cached to bust and
//! removed branches are not busted either. Any difference in the tag list
//! busts the whole `tags` collection once.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{PollError, Result};

use super::changeset::ChangeManager;
use super::{sleep_or_shutdown, ChangeSource};

/// Default polling interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Cache-bust key covering the whole tag collection.
const TAGS_KEY: &str = "tags";

/// Snapshot of a remote's refs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefSnapshot {
    /// Branch name to revision.
    pub branches: BTreeMap<String, String>,
    /// Tag names, in listing order.
    pub tags: Vec<String>,
}

/// Poller watching a git remote for new commits.
#[derive(Debug)]
pub struct GitChangeSource {
    name: String,
    repository: String,
    interval: Duration,
    snapshot: RefSnapshot,
}

impl GitChangeSource {
    /// Creates a source polling `repository` every
    /// [`DEFAULT_POLL_INTERVAL_SECS`] seconds.
    #[must_use]
    pub fn new(name: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repository: repository.into(),
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            snapshot: RefSnapshot::default(),
        }
    }

    /// Overrides the polling interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The current snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &RefSnapshot {
        &self.snapshot
    }

    /// Parses `git ls-remote` output into a snapshot.
    fn parse_refs(listing: &str) -> RefSnapshot {
        let mut snapshot = RefSnapshot::default();

        for line in listing.lines() {
            let mut fields = line.split_whitespace();
            let (Some(sha), Some(reference)) = (fields.next(), fields.next()) else {
                continue;
            };

            if let Some(branch) = reference.strip_prefix("refs/heads/") {
                snapshot
                    .branches
                    .insert(branch.to_string(), sha.to_string());
            } else if let Some(tag) = reference.strip_prefix("refs/tags/") {
                // Peeled tag refs duplicate the tag name.
                if tag.ends_with("^{}") {
                    continue;
                }
                snapshot.tags.push(tag.to_string());
            }
        }

        snapshot
    }

    /// Computes the cache-busts one cycle emits.
    ///
    /// Only branches that existed before the cycle and changed revision
    /// bust their key; a differing tag list busts `tags` once.
    fn diff(old: &RefSnapshot, new: &RefSnapshot) -> Vec<String> {
        let mut busts = Vec::new();

        if new.branches != old.branches {
            for (name, sha) in &new.branches {
                if let Some(previous) = old.branches.get(name)
                    && previous != sha
                {
                    busts.push(name.clone());
                }
            }
        }

        if new.tags != old.tags {
            busts.push(String::from(TAGS_KEY));
        }

        busts
    }

    async fn fetch_remote_refs(&self) -> Result<RefSnapshot> {
        let output = tokio::process::Command::new("git")
            .args(["ls-remote", &self.repository])
            .output()
            .await
            .map_err(|e| PollError::unavailable(&self.name, format!("git ls-remote: {e}")))?;

        if !output.status.success() {
            return Err(PollError::unavailable(
                &self.name,
                String::from_utf8_lossy(&output.stderr).into_owned(),
            )
            .into());
        }

        Ok(Self::parse_refs(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Diffs a fresh observation against the snapshot and commits the
    /// snapshot update plus busts as one changeset. Returns false when
    /// the responder is gone.
    fn commit_cycle(&mut self, manager: &ChangeManager, observed: RefSnapshot) -> bool {
        let busts = Self::diff(&self.snapshot, &observed);

        let mut changeset = manager.changeset(&self.name);
        for key in busts {
            changeset.bust(key);
        }
        if !changeset.commit() {
            return false;
        }
        self.snapshot = observed;
        true
    }
}

#[async_trait]
impl ChangeSource for GitChangeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prime(&mut self) -> Result<()> {
        let snapshot = self.fetch_remote_refs().await.map_err(|e| {
            PollError::InitialFetch {
                source_name: self.name.clone(),
                message: e.to_string(),
            }
        })?;

        debug!(
            "Primed '{}': {} branches, {} tags",
            self.name,
            snapshot.branches.len(),
            snapshot.tags.len()
        );
        self.snapshot = snapshot;
        Ok(())
    }

    async fn test(&self) -> Result<()> {
        self.fetch_remote_refs().await.map(|_| ())
    }

    async fn run(
        &mut self,
        manager: ChangeManager,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            if sleep_or_shutdown(self.interval, &mut shutdown).await {
                return Ok(());
            }

            match self.fetch_remote_refs().await {
                Ok(observed) => {
                    if !self.commit_cycle(&manager, observed) {
                        return Ok(());
                    }
                }
                Err(e) => {
                    // Transient; the next cycle retries.
                    warn!("{e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(branches: &[(&str, &str)], tags: &[&str]) -> RefSnapshot {
        RefSnapshot {
            branches: branches
                .iter()
                .map(|(name, sha)| ((*name).to_string(), (*sha).to_string()))
                .collect(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_refs() {
        let listing = "\
29fa9a1312c85ac5084e4bb47fc2ba912b4d92d5\tHEAD
29fa9a1312c85ac5084e4bb47fc2ba912b4d92d5\trefs/heads/master
0fd1fca2e1b1f2f8c32e98dc371a6ae6a5e268a8\trefs/heads/release
f0ecea0e591b9a2cc55f3f9c188a34ee1besomet\trefs/tags/v1.0
f0ecea0e591b9a2cc55f3f9c188a34ee1besomet\trefs/tags/v1.0^{}
";
        let parsed = GitChangeSource::parse_refs(listing);
        assert_eq!(parsed.branches.len(), 2);
        assert_eq!(
            parsed.branches["master"],
            "29fa9a1312c85ac5084e4bb47fc2ba912b4d92d5"
        );
        // The peeled ref is skipped.
        assert_eq!(parsed.tags, vec![String::from("v1.0")]);
    }

    #[test]
    fn test_diff_busts_only_changed_preexisting_branches() {
        let old = snapshot(&[("a", "sha1"), ("b", "sha2")], &[]);
        let new = snapshot(&[("a", "sha1"), ("b", "sha3"), ("c", "sha4")], &[]);

        // Exactly one bust: b. The new branch c is never retroactively
        // busted.
        assert_eq!(GitChangeSource::diff(&old, &new), vec![String::from("b")]);
    }

    #[test]
    fn test_diff_ignores_removed_branches() {
        let old = snapshot(&[("a", "sha1"), ("gone", "sha2")], &[]);
        let new = snapshot(&[("a", "sha1")], &[]);

        assert!(GitChangeSource::diff(&old, &new).is_empty());
    }

    #[test]
    fn test_diff_tags_bust_whole_collection_once() {
        let old = snapshot(&[], &["v1.0"]);
        let new = snapshot(&[], &["v1.0", "v1.1"]);

        assert_eq!(GitChangeSource::diff(&old, &new), vec![String::from("tags")]);
    }

    #[test]
    fn test_diff_unchanged_is_silent() {
        let same = snapshot(&[("a", "sha1")], &["v1.0"]);
        assert!(GitChangeSource::diff(&same, &same.clone()).is_empty());
    }

    #[tokio::test]
    async fn test_commit_cycle_is_atomic() {
        let (manager, mut rx) = ChangeManager::channel();
        let mut source = GitChangeSource::new("changesource", "https://example.invalid/repo");
        source.snapshot = snapshot(&[("a", "sha1"), ("b", "sha2")], &[]);

        let observed = snapshot(&[("a", "sha1"), ("b", "sha3"), ("c", "sha4")], &[]);
        assert!(source.commit_cycle(&manager, observed.clone()));

        // Exactly one bust fired, and the committed snapshot equals the
        // new mapping.
        let bust = rx.try_recv().expect("bust");
        assert_eq!(bust.key, "b");
        assert_eq!(bust.source, "changesource");
        assert!(rx.try_recv().is_err());
        assert_eq!(source.snapshot(), &observed);
    }

    #[tokio::test]
    async fn test_commit_cycle_stops_after_shutdown() {
        let (manager, rx) = ChangeManager::channel();
        drop(rx);

        let mut source = GitChangeSource::new("changesource", "https://example.invalid/repo");
        source.snapshot = snapshot(&[("a", "sha1")], &[]);
        let before = source.snapshot().clone();

        let observed = snapshot(&[("a", "sha2")], &[]);
        assert!(!source.commit_cycle(&manager, observed));

        // The failed commit left no partial update observable.
        assert_eq!(source.snapshot(), &before);
    }
}
