//! relform-server - release submission form
//!
//! Serves the submission form and records accepted submissions in the
//! ledger under the data directory. Several processes may share one data
//! directory; commits are serialized by a file lock.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relform_common::config::{Config, ConfigSource, LoggingConfig};
use relform_common::CommitPipeline;
use relform_server::api::buildinfo::BuildInfo;
use relform_server::{build_router, AppState};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relform-server", version, about = "Release submission form server")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (overrides RELFORM_DATA_DIR and the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:4567
    #[arg(short, long)]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Serve the form over HTTP (default)
    Serve,
    /// Print every ledger row as one JSON object per line
    DumpLedger,
    /// Move the sequence counter up to the ledger's highest sequence
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, source) = Config::load(args.config.as_deref())?;
    config.resolve_data_dir(args.data_dir);
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    init_tracing(&config.logging)?;

    let build = BuildInfo::current();
    info!(
        "Starting relform-server v{} [{}] built {} ({})",
        build.version, build.git_hash, build.build_timestamp, build.build_profile
    );
    match source {
        ConfigSource::Defaults => warn!("Config: {}", source),
        _ => info!("Config: {}", source),
    }
    info!("Data directory: {}", config.data_dir.display());
    for warning in config.warnings() {
        warn!("{}", warning);
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::DumpLedger => dump_ledger(&config),
        Command::Reconcile => {
            config.layout().ensure_directories()?;
            let sequence = CommitPipeline::from_config(&config)?.reconcile()?;
            info!("Sequence counter at {}", sequence);
            Ok(())
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let state = AppState::from_config(&config).context("Failed to open data directory")?;

    let pipeline = Arc::clone(state.controller.pipeline());
    let sequence = tokio::task::spawn_blocking(move || pipeline.reconcile())
        .await
        .context("Reconcile task failed")??;
    info!("Next sequence: {}", sequence + 1);

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Listening on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn dump_ledger(config: &Config) -> Result<()> {
    let pipeline = CommitPipeline::from_config(config)?;
    for row in pipeline.ledger().read_all()? {
        let object: serde_json::Map<String, serde_json::Value> = row
            .pairs()
            .map(|(name, value)| (name.to_string(), serde_json::Value::from(value)))
            .collect();
        println!("{}", serde_json::Value::Object(object));
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
