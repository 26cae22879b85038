//! spendcast-serve - prediction service
//!
//! Loads the active model version at startup (starting in NO_MODEL when
//! there is none) and serves the prediction page and JSON API.

use anyhow::{Context, Result};
use clap::Parser;
use spendcast_common::config::{LoggingConfig, TomlConfig};
use spendcast_common::{EventLogger, ModelRegistry, SchemaContract};
use spendcast_serve::{build_router, AppState, ServingState};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "spendcast-serve")]
#[command(about = "Prediction service for the 7-day spend model")]
#[command(version)]
struct Args {
    /// Configuration file (overrides SPENDCAST_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder (overrides SPENDCAST_ROOT and root_folder)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref())?;
    let root = config.resolve_root_folder(args.root.as_deref());
    let layout = config.layout(&root);
    layout
        .ensure_directories()
        .with_context(|| format!("Failed to prepare root folder {}", root.display()))?;

    init_tracing(&config.logging, &layout.root)?;

    info!(
        "Starting Spendcast prediction service (spendcast-serve) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Root folder: {}", layout.root.display());

    let events = EventLogger::with_jsonl(&layout.events);
    let registry = ModelRegistry::new(&layout.models, events.clone());
    let serving = Arc::new(ServingState::new(registry, events));

    let snapshot = serving.load_current().await;
    match snapshot.active_version() {
        Some(version) => info!("✓ Serving model version {}", version),
        None => warn!("No model available yet; serving in NO_MODEL state until /reload"),
    }

    // The form falls back to schema features while no model is loaded
    let schema = match SchemaContract::load(&layout.schema) {
        Ok(schema) => Some(schema),
        Err(e) => {
            warn!("Schema not available for the input form: {}", e);
            None
        }
    };

    let app = build_router(AppState::new(serving, schema));

    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", config.server.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("spendcast-serve listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Install the global subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(logging: &LoggingConfig, root: &Path) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match &logging.file {
        Some(file) => {
            let path = root.join(file);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}
