//! Watch mode: change-driven re-application.
//!
//! One cooperative task per change source, plus a responder that drains
//! cache-bust events and re-applies the bundle. Tasks are multiplexed on
//! the runtime's single scheduling loop and suspend only at network and
//! timer wait points. A failure inside one poller never terminates its
//! siblings, and shutdown lets an in-flight changeset finish committing:
//! commits contain no await point, so a task is never cancelled half-way
//! through one.

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::source::{CacheBust, ChangeManager, ChangeSource};

use super::{ApplyEngine, Context};

/// Runs watch mode until shutdown.
///
/// Every source must already be primed. Blocks until the shutdown flag
/// flips and all poller tasks have been joined.
///
/// # Errors
///
/// Returns state-store failures from re-application; poller and
/// per-cycle apply failures are isolated and logged instead.
pub async fn run_watch(
    engine: &ApplyEngine,
    ctx: &Context,
    sources: Vec<Box<dyn ChangeSource>>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let (manager, mut events) = ChangeManager::channel();

    let mut tasks = JoinSet::new();
    for mut source in sources {
        let manager = manager.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            let name = source.name().to_string();
            info!("Watching change source '{name}'");
            if let Err(e) = source.run(manager, shutdown).await {
                // Isolate the failure: siblings keep polling.
                error!("Change source '{name}' terminated: {e}");
            }
        });
    }
    // The responder owns the only remaining sender via the tasks.
    drop(manager);

    let mut shutdown_rx = shutdown.clone();
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(first) => {
                        let mut busts = vec![first];
                        while let Ok(more) = events.try_recv() {
                            busts.push(more);
                        }
                        respond(engine, ctx, &busts).await;
                    }
                    None => break,
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    while tasks.join_next().await.is_some() {}
    Ok(())
}

/// Re-applies the bundle after a batch of cache-busts.
async fn respond(engine: &ApplyEngine, ctx: &Context, busts: &[CacheBust]) {
    let keys: Vec<String> = busts
        .iter()
        .map(|b| format!("{}:{}", b.source, b.key))
        .collect();
    info!("Cache busted ({}); re-applying", keys.join(", "));

    match engine.apply(ctx).await {
        Ok(true) => info!("Re-application changed the target"),
        Ok(false) => info!("Re-application found nothing to change"),
        // The next event will retry; watch mode never dies on one failed
        // convergence.
        Err(e) => warn!("Re-application failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{context_with_state, memory_state};
    use crate::engine::RunOptions;
    use crate::provider::test_support::recording_registry;
    use crate::resource::{FileSpec, Policy, Resource, ResourceBundle, ResourceKind};
    use async_trait::async_trait;
    use crate::error::PollError;

    fn bundle() -> ResourceBundle {
        ResourceBundle::new(vec![Resource {
            kind: ResourceKind::File(FileSpec {
                name: String::from("/a"),
                owner: None,
                group: None,
                mode: None,
            }),
            policy: Policy::Apply,
            requires: vec![],
        }])
    }

    /// Emits one bust, then waits for shutdown.
    struct OneShotSource {
        name: String,
        fail: bool,
    }

    #[async_trait]
    impl ChangeSource for OneShotSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn prime(&mut self) -> Result<()> {
            Ok(())
        }

        async fn run(
            &mut self,
            manager: ChangeManager,
            mut shutdown: watch::Receiver<bool>,
        ) -> Result<()> {
            if self.fail {
                return Err(PollError::unavailable(&self.name, "scripted death").into());
            }
            let mut changeset = manager.changeset(&self.name);
            changeset.bust("master");
            let _ = changeset.commit();
            let _ = shutdown.changed().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_bust_triggers_reapplication_and_shutdown_joins() {
        let (registry, script) = recording_registry();
        let state = memory_state();
        let ctx = context_with_state(state, RunOptions::default());
        let engine = ApplyEngine::new(bundle(), &registry, &ctx).expect("bind");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sources: Vec<Box<dyn ChangeSource>> = vec![
            Box::new(OneShotSource {
                name: String::from("good"),
                fail: false,
            }),
            // A dying poller must not take the watcher down.
            Box::new(OneShotSource {
                name: String::from("bad"),
                fail: true,
            }),
        ];

        let watcher = run_watch(&engine, &ctx, sources, shutdown_rx);
        let driver = async {
            // Give the responder a moment to consume the bust.
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            shutdown_tx.send(true).expect("signal shutdown");
        };

        let (result, ()) = tokio::join!(watcher, driver);
        result.expect("watch returns cleanly");

        // The bust from the healthy source triggered one apply.
        assert_eq!(script.invocations(), vec!["File[/a]"]);
    }
}
