//! spendcast-pipeline - scheduled batch runner
//!
//! One invocation processes one micro-batch (or, with `run --drain`, every
//! pending batch). Also carries the operator commands for bootstrapping the
//! database, inspecting progress and re-pointing the active model.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spendcast_common::config::{Layout, LoggingConfig, TomlConfig};
use spendcast_common::db::{ensure_source_table, init_database};
use spendcast_common::{EventLogger, ModelRegistry, SchemaContract};
use spendcast_pipeline::{CursorStore, Pipeline, RunOutcome};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "spendcast-pipeline")]
#[command(about = "Incremental training pipeline for the 7-day spend model")]
#[command(version)]
struct Args {
    /// Configuration file (overrides SPENDCAST_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder (overrides SPENDCAST_ROOT and root_folder)
    #[arg(short, long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process the next micro-batch (default)
    Run {
        /// Keep running until no new rows remain
        #[arg(long)]
        drain: bool,
    },
    /// Create the database, state table and source table
    InitDb,
    /// Show cursor position and active model version
    Status,
    /// List stored model versions
    Versions,
    /// Re-point the active model at a stored version
    Rollback { version: String },
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
        "Starting Spendcast pipeline (spendcast-pipeline) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Root folder: {}", layout.root.display());

    let events = EventLogger::with_jsonl(&layout.events);

    match args.command.unwrap_or(Command::Run { drain: false }) {
        Command::Run { drain } => run(&config, &layout, events, drain).await,
        Command::InitDb => init_db(&config, &layout).await,
        Command::Status => status(&layout, events).await,
        Command::Versions => {
            let registry = ModelRegistry::new(&layout.models, events);
            let active = registry.current_version()?;
            for version in registry.versions()? {
                let marker = if active.as_deref() == Some(version.as_str()) { "*" } else { " " };
                println!("{} {}", marker, version);
            }
            Ok(())
        }
        Command::Rollback { version } => {
            let registry = ModelRegistry::new(&layout.models, events);
            registry.rollback(&version)?;
            println!("Active model version: {}", version);
            Ok(())
        }
    }
}

async fn run(config: &TomlConfig, layout: &Layout, events: EventLogger, drain: bool) -> Result<()> {
    let pool = init_database(&layout.database).await?;
    let pipeline = Pipeline::from_layout(pool, config.source.clone(), layout, events)?;

    loop {
        let outcome = match pipeline.run_once().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Pipeline run failed: {}", e);
                return Err(e.into());
            }
        };

        match &outcome {
            RunOutcome::NoData { cursor } => {
                info!("No new rows after id {}", cursor);
                return Ok(());
            }
            RunOutcome::TrainingSkipped { rows, cursor } => {
                info!("Consumed {} rows up to id {} without training", rows, cursor);
            }
            RunOutcome::Promoted {
                version, rows, cursor, ..
            } => {
                info!("Trained on {} rows up to id {}; active model {}", rows, cursor, version);
            }
        }

        if !drain {
            return Ok(());
        }
    }
}

async fn init_db(config: &TomlConfig, layout: &Layout) -> Result<()> {
    let pool = init_database(&layout.database).await?;
    let schema = SchemaContract::load(&layout.schema)
        .context("init-db needs the schema document to create the source table")?;
    ensure_source_table(&pool, &config.source, &schema).await?;
    println!("Database ready: {}", layout.database.display());
    Ok(())
}

async fn status(layout: &Layout, events: EventLogger) -> Result<()> {
    let pool = init_database(&layout.database).await?;
    let cursor = CursorStore::peek(&pool).await?;
    let registry = ModelRegistry::new(&layout.models, events);

    match cursor {
        Some(id) => println!("Last processed id: {}", id),
        None => println!("Last processed id: (no run yet)"),
    }
    match registry.current_version()? {
        Some(version) => println!("Active model version: {}", version),
        None => println!("Active model version: (none)"),
    }
    println!("Stored versions: {}", registry.versions()?.len());
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
