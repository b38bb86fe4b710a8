//! The run context shared by every provider.
//!
//! One context is built per run and shared read-only across providers;
//! apply is strictly sequential, so no provider ever observes another
//! mid-mutation. The context carries the transport, the simulate flag,
//! the audit change log, the shared state store and the per-run cloud
//! driver slot.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::changelog::{ChangeLog, ResourceChange};
use crate::cloud::{DnsDriver, DnsDriverRegistry, DriverConfig};
use crate::error::{Result, TransportError};
use crate::state::SharedState;
use crate::transport::Transport;

/// Options a run consumes from the CLI and configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Report intended changes without mutating target state.
    pub simulate: bool,
    /// Skip resources already marked converged in persisted state.
    pub resume: bool,
    /// Discard persisted convergence marks before applying.
    pub no_resume: bool,
}

/// Shared run context.
pub struct Context {
    /// Transport to the target environment.
    pub transport: Arc<dyn Transport>,
    /// Dry-run flag. Providers report intended changes but never mutate.
    pub simulate: bool,
    /// Whether converged resources are skipped.
    pub resume: bool,
    /// Whether persisted convergence marks are discarded first.
    pub no_resume: bool,
    /// Audit change log sink.
    pub changelog: ChangeLog,
    /// Shared part-state store.
    pub state: SharedState,
    dns_registry: Arc<DnsDriverRegistry>,
    dns_driver: OnceCell<Arc<dyn DnsDriver>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("simulate", &self.simulate)
            .field("resume", &self.resume)
            .field("no_resume", &self.no_resume)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Creates a run context.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        changelog: ChangeLog,
        state: SharedState,
        options: RunOptions,
        dns_registry: Arc<DnsDriverRegistry>,
    ) -> Self {
        Self {
            transport,
            simulate: options.simulate,
            resume: options.resume,
            no_resume: options.no_resume,
            changelog,
            state,
            dns_registry,
            dns_driver: OnceCell::new(),
        }
    }

    /// Runs a command on the target, recording it in the change scope.
    ///
    /// Under simulate the command is recorded but never executed.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the command cannot be run or exits
    /// non-zero.
    pub async fn execute(&self, change: &mut ResourceChange, argv: &[&str]) -> Result<()> {
        change.info(format!("$ {}", argv.join(" ")));

        if self.simulate {
            return Ok(());
        }

        let argv: Vec<String> = argv.iter().map(|s| (*s).to_string()).collect();
        let outcome = self.transport.execute(&argv).await?;

        if outcome.success() {
            Ok(())
        } else {
            Err(TransportError::CommandFailed {
                command: argv.join(" "),
                status: outcome.status,
                stderr: outcome.stderr,
            }
            .into())
        }
    }

    /// Returns the run's cloud DNS driver, building it on first use from
    /// static configuration. Single-assignment: later calls return the
    /// driver built first.
    ///
    /// # Errors
    ///
    /// Propagates registry and factory failures.
    pub async fn dns_driver(&self, config: &DriverConfig) -> Result<Arc<dyn DnsDriver>> {
        self.dns_driver
            .get_or_try_init(|| async { self.dns_registry.build(config) })
            .await
            .map(Arc::clone)
    }
}
