//! Atomic changesets of cache-bust events.
//!
//! A poller accumulates the busts of one cycle into a [`Changeset`] and
//! commits them together with its snapshot mutation. `commit` contains no
//! await point, so under the cooperative scheduler a changeset is
//! observed in full or not at all; a failure earlier in the cycle leaves
//! no partial update behind.

use tokio::sync::mpsc;
use tracing::debug;

/// Invalidation of one previously cached graph value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheBust {
    /// The change source that observed the change.
    pub source: String,
    /// The invalidated key (a branch name, or a whole-collection key).
    pub key: String,
}

/// Sender half connecting pollers to the re-application responder.
#[derive(Debug, Clone)]
pub struct ChangeManager {
    tx: mpsc::UnboundedSender<CacheBust>,
}

impl ChangeManager {
    /// Creates a manager feeding the given channel.
    #[must_use]
    pub const fn new(tx: mpsc::UnboundedSender<CacheBust>) -> Self {
        Self { tx }
    }

    /// Creates a manager plus its receiving end.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CacheBust>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Opens a changeset scoped to one source.
    #[must_use]
    pub fn changeset(&self, source: &str) -> Changeset {
        Changeset {
            source: source.to_string(),
            tx: self.tx.clone(),
            busts: Vec::new(),
        }
    }
}

/// One poll cycle's batch of cache-busts.
#[derive(Debug)]
pub struct Changeset {
    source: String,
    tx: mpsc::UnboundedSender<CacheBust>,
    busts: Vec<String>,
}

impl Changeset {
    /// Queues a cache-bust for `key`. Nothing is observable until
    /// [`Changeset::commit`].
    pub fn bust(&mut self, key: impl Into<String>) {
        self.busts.push(key.into());
    }

    /// Returns true if no busts are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.busts.is_empty()
    }

    /// Commits the batch. Returns false when the responder is gone
    /// (shutdown), in which case the caller should stop polling.
    #[must_use]
    pub fn commit(self) -> bool {
        if !self.busts.is_empty() {
            debug!(
                "Committing changeset from '{}': {:?}",
                self.source, self.busts
            );
        }
        for key in self.busts {
            let bust = CacheBust {
                source: self.source.clone(),
                key,
            };
            if self.tx.send(bust).is_err() {
                return false;
            }
        }
        true
    }
}
