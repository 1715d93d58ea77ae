//! a360-watcher - ComfyUI output watcher
//!
//! Watches the ComfyUI output folder for aged face images, files each one into the subject
//! archive, records it in the ledger workbook, appends a dataset index line and pushes live
//! status events to WebSocket clients.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use a360_common::config::{ConfigResolver, WatcherConfig};
use a360_common::jsonl::JsonlWriter;
use a360_watcher::broadcaster::{run_dispatch, Broadcaster, StatusPublisher};
use a360_watcher::ingest::{reconcile_archive, Ingestor};
use a360_watcher::ledger::{LedgerSettings, LedgerStore, XlsxLedger};
use a360_watcher::services::FolderWatcher;
use a360_watcher::{AppState, LedgerError};

/// Command-line arguments for a360-watcher
#[derive(Parser, Debug)]
#[command(name = "a360-watcher")]
#[command(about = "Files ComfyUI aging output into the A360 archive and ledger")]
#[command(version)]
struct Args {
    /// Config file (TOML or JSON)
    #[arg(short, long, env = "A360_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Watch the output folder and serve status events (default)
    Watch,
    /// Record archive files that have no ledger row, then print a JSON report
    Reconcile,
    /// Sort Images and regenerate Prompts_Auto, then exit
    RefreshPrompts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigResolver::new(args.config.clone())
        .load()
        .context("Failed to load config")?;

    // Diagnostics go to stderr; stdout carries command output such as the reconcile report
    let default_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting a360-watcher v{}", env!("CARGO_PKG_VERSION"));

    config
        .validate_startup_paths()
        .context("Startup path check failed")?;

    let ledger = Arc::new(LedgerStore::new(
        Arc::new(XlsxLedger::new(config.excel_path.clone())),
        LedgerSettings::from_config(&config),
    ));
    info!("Ledger: {}", ledger.describe());

    match args.command.unwrap_or(Command::Watch) {
        Command::RefreshPrompts => {
            refresh_prompts(&ledger)?;
            Ok(())
        }
        Command::Reconcile => {
            let report = reconcile_archive(&ledger, &config.project_root, &config.image_extension)
                .map_err(locked_hint)?;
            info!(
                repaired = report.repaired.len(),
                already_present = report.already_present,
                "Reconcile complete"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Watch => {
            refresh_prompts(&ledger)?;
            watch(config, ledger).await
        }
    }
}

fn refresh_prompts(ledger: &LedgerStore) -> Result<()> {
    let rows = ledger.refresh_prompts().map_err(locked_hint)?;
    info!(rows, "Prompts_Auto regenerated");
    Ok(())
}

fn locked_hint(err: LedgerError) -> anyhow::Error {
    match err {
        LedgerError::Locked(path) => anyhow::anyhow!(
            "Ledger workbook {} is locked; close the workbook and restart",
            path.display()
        ),
        other => other.into(),
    }
}

async fn watch(config: WatcherConfig, ledger: Arc<LedgerStore>) -> Result<()> {
    let event_log = config
        .write_event_log
        .then(|| Arc::new(JsonlWriter::new(config.event_log_path())));
    let (publisher, events) = StatusPublisher::channel(event_log);

    let ingestor = Arc::new(Ingestor::from_config(&config, ledger, publisher));
    let subjects = ingestor
        .refresh_subjects()
        .map_err(locked_hint)
        .context("Failed to load Subjects")?;
    info!(subjects, "Subject cache loaded");

    let broadcaster = Arc::new(Broadcaster::new());
    tokio::spawn(run_dispatch(events, broadcaster.clone()));

    let handle = tokio::runtime::Handle::current();
    let worker = ingestor.clone();
    let watcher = FolderWatcher::start(&config.comfy_output_dir, move |path| {
        let ingestor = worker.clone();
        handle.spawn_blocking(move || ingestor.process(&path));
    })
    .context("Failed to start folder watcher")?;

    let app = a360_watcher::build_router(AppState::new(broadcaster));
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Watching: {}", watcher.dir().display());
    info!("Archive root: {}", config.project_root.display());
    info!("Status WebSocket: ws://{}/ws", addr);
    info!("Health check: http://{}/health", addr);
    if config.write_dataset_index {
        info!("Dataset index: {}", config.dataset_index_path().display());
    }
    if config.write_event_log {
        info!("Event log: {}", config.event_log_path().display());
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    drop(watcher);
    info!("Watcher stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
