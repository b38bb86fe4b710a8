//! Converge CLI entrypoint.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use converge::changelog::{ChangeLog, LogFormat};
use converge::cli::{Cli, Commands, StatusFormatter};
use converge::cloud::DnsDriverRegistry;
use converge::config::{
    find_bundle_file, BundleFile, BundleLoader, SourceKind, StateBackendKind,
};
use converge::engine::{run_watch, ApplyEngine, Context, RunOptions};
use converge::error::{ConvergeError, Result};
use converge::provider::ProviderRegistry;
use converge::resource::ResourceBundle;
use converge::source::ChangeSource;
use converge::state::{
    CloudStateBackend, LocalStateBackend, PartStore, SimulatedStateStore, StateStore,
};
use converge::transport::LocalTransport;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Pollers are cooperative tasks multiplexed on one scheduling loop;
    // a current-thread runtime is the whole concurrency model.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_nothing_changed() {
                eprintln!("{e}");
            } else {
                eprintln!("Error: {e}");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Up {
            simulate,
            resume,
            no_resume,
        } => {
            let options = RunOptions {
                simulate,
                resume,
                no_resume,
            };
            cmd_up(cli.config.as_ref(), cli.html.as_ref(), options).await
        }
        Commands::Destroy { simulate } => {
            let options = RunOptions {
                simulate,
                ..RunOptions::default()
            };
            cmd_destroy(cli.config.as_ref(), cli.html.as_ref(), options).await
        }
        Commands::Run {
            simulate,
            resume,
            no_resume,
        } => {
            let options = RunOptions {
                simulate,
                resume,
                no_resume,
            };
            cmd_run(cli.config.as_ref(), cli.html.as_ref(), options).await
        }
        Commands::Test => cmd_test(cli.config.as_ref()).await,
        Commands::Expand => cmd_expand(cli.config.as_ref()),
        Commands::Status => cmd_status(cli.config.as_ref()).await,
    }
}

/// Create or update the cluster.
async fn cmd_up(
    config_path: Option<&PathBuf>,
    html: Option<&PathBuf>,
    options: RunOptions,
) -> Result<()> {
    let (bundle, base) = load_bundle(config_path)?;
    let ctx = build_context(&bundle, &base, html, options).await?;
    let registry = ProviderRegistry::builtin();
    let engine = ApplyEngine::new(ResourceBundle::new(bundle.resources.clone()), &registry, &ctx)?;

    // Validation must pass before anything mutates.
    engine.test(&ctx).await?;

    let changed = engine.apply(&ctx).await?;
    if !changed {
        return Err(ConvergeError::NothingChanged);
    }

    info!("Cluster '{}' converged", bundle.cluster);
    Ok(())
}

/// Destroy declared resources.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    html: Option<&PathBuf>,
    options: RunOptions,
) -> Result<()> {
    let (bundle, base) = load_bundle(config_path)?;
    let ctx = build_context(&bundle, &base, html, options).await?;
    let registry = ProviderRegistry::builtin();
    let engine = ApplyEngine::new(
        ResourceBundle::new(bundle.resources.clone()).for_destroy(),
        &registry,
        &ctx,
    )?;

    engine.test(&ctx).await?;

    let changed = engine.destroy(&ctx).await?;
    if changed {
        info!("Cluster '{}' destroyed", bundle.cluster);
    } else {
        info!("Nothing to destroy for cluster '{}'", bundle.cluster);
    }
    Ok(())
}

/// Watch mode: poll change sources and re-apply on events.
async fn cmd_run(
    config_path: Option<&PathBuf>,
    html: Option<&PathBuf>,
    options: RunOptions,
) -> Result<()> {
    let (bundle, base) = load_bundle(config_path)?;
    let ctx = build_context(&bundle, &base, html, options).await?;
    let registry = ProviderRegistry::builtin();
    let engine = ApplyEngine::new(ResourceBundle::new(bundle.resources.clone()), &registry, &ctx)?;

    engine.test(&ctx).await?;

    // Every source needs an initial snapshot before it can diff.
    let mut sources = build_sources(&bundle);
    for source in &mut sources {
        source.prime().await?;
    }

    // Converge once up front; watch keeps the target converged after.
    if engine.apply(&ctx).await? {
        info!("Initial convergence changed the target");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    run_watch(&engine, &ctx, sources, shutdown_rx).await
}

/// Validate the bundle without deploying.
async fn cmd_test(config_path: Option<&PathBuf>) -> Result<()> {
    let (bundle, base) = load_bundle(config_path)?;
    let ctx = build_context(&bundle, &base, None, RunOptions::default()).await?;
    let registry = ProviderRegistry::builtin();
    let engine = ApplyEngine::new(ResourceBundle::new(bundle.resources.clone()), &registry, &ctx)?;

    engine.test(&ctx).await?;

    for source in build_sources(&bundle) {
        source.test().await?;
    }

    eprintln!("Bundle for cluster '{}' is valid.", bundle.cluster);
    Ok(())
}

/// Print the resolved bundle YAML.
fn cmd_expand(config_path: Option<&PathBuf>) -> Result<()> {
    let (bundle, _base) = load_bundle(config_path)?;

    let resolved = serde_yaml::to_string(&bundle).map_err(|e| {
        ConvergeError::internal(format!("Failed to serialize bundle: {e}"))
    })?;
    println!("{resolved}");
    Ok(())
}

/// Show persisted cluster state.
async fn cmd_status(config_path: Option<&PathBuf>) -> Result<()> {
    let (bundle, base) = load_bundle(config_path)?;
    let state = build_state(&bundle, &base, false).await?;

    let parts = state.lock().await.parts().await?;
    let formatter = StatusFormatter::new();
    println!("{}", formatter.format_parts(&bundle.cluster, &parts));
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves and loads the bundle file, returning it with its directory.
fn load_bundle(config_path: Option<&PathBuf>) -> Result<(BundleFile, PathBuf)> {
    let bundle_file = config_path.map_or_else(|| find_bundle_file("."), |path| Ok(path.clone()))?;
    debug!("Loading bundle from: {}", bundle_file.display());

    let base = bundle_file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let loader = BundleLoader::new().with_base_path(&base);
    loader.load_dotenv()?;
    let bundle = loader.load_with_env(&bundle_file)?;

    Ok((bundle, base))
}

/// Creates the shared state store from the bundle's backend config.
async fn build_state(
    bundle: &BundleFile,
    base: &Path,
    simulate: bool,
) -> Result<converge::state::SharedState> {
    let store = match bundle.state.backend {
        StateBackendKind::Local => {
            let dir = bundle
                .state
                .path
                .as_ref()
                .map_or_else(|| base.join(".converge"), PathBuf::from);
            StateStore::new(Box::new(LocalStateBackend::new(dir)))
        }
        StateBackendKind::Cloud => {
            let bucket = bundle
                .state
                .bucket
                .as_deref()
                .ok_or_else(|| ConvergeError::internal("Cloud state backend needs a bucket"))?;
            let backend = CloudStateBackend::new(
                bucket,
                &bundle.cluster,
                bundle.state.prefix.as_deref(),
                bundle.state.region.as_deref(),
            )
            .await?;
            StateStore::new(Box::new(backend))
        }
    };

    // Dry runs capture writes in memory and never persist them.
    if simulate {
        Ok(Arc::new(tokio::sync::Mutex::new(
            Box::new(SimulatedStateStore::new(store)) as Box<dyn PartStore>,
        )))
    } else {
        Ok(store.into_shared())
    }
}

/// Builds the run context.
async fn build_context(
    bundle: &BundleFile,
    base: &Path,
    html: Option<&PathBuf>,
    options: RunOptions,
) -> Result<Context> {
    let state = build_state(bundle, base, options.simulate).await?;

    // The audit format is fixed once per process, never mixed in a run.
    let changelog = match html {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            ChangeLog::with_writer(LogFormat::Html, Box::new(file))
        }
        None => ChangeLog::new(LogFormat::Text),
    };

    Ok(Context::new(
        Arc::new(LocalTransport::new()),
        changelog,
        state,
        options,
        Arc::new(DnsDriverRegistry::new()),
    ))
}

/// Instantiates the declared change sources.
fn build_sources(bundle: &BundleFile) -> Vec<Box<dyn ChangeSource>> {
    bundle
        .sources
        .iter()
        .map(|config| {
            let interval = Duration::from_secs(config.polling_interval);
            match config.kind {
                SourceKind::Git => Box::new(
                    converge::source::GitChangeSource::new(&config.name, &config.repository)
                        .with_interval(interval),
                ) as Box<dyn ChangeSource>,
                SourceKind::Hosted => {
                    let mut source = converge::source::HostedEventsSource::new(
                        &config.name,
                        &config.repository,
                    )
                    .with_interval(interval);
                    if let Some(api_base) = &config.api_base {
                        source = source.with_api_base(api_base);
                    }
                    Box::new(source)
                }
            }
        })
        .collect()
}
