//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a single TOML file. Every key has a
//! compiled default, so a missing file only produces a warning.
//!
//! Config file priority:
//! 1. Command-line argument (`--config`)
//! 2. `SPENDCAST_CONFIG` environment variable
//! 3. `<config_dir>/spendcast/config.toml`
//! 4. Compiled defaults
//!
//! Root folder priority:
//! 1. Command-line argument (`--root`)
//! 2. `SPENDCAST_ROOT` environment variable
//! 3. `root_folder` in the TOML file
//! 4. OS-dependent compiled default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_ENV_VAR: &str = "SPENDCAST_CONFIG";
pub const ROOT_ENV_VAR: &str = "SPENDCAST_ROOT";

/// Default micro-batch size for extraction
pub const DEFAULT_BATCH_SIZE: i64 = 10;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder for database, models, config documents and logs
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file (relative to the root folder)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Source table that the extractor reads from
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_table")]
    pub table: String,

    /// Monotonic row identifier; stripped from batches
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Ingestion timestamp; stripped from batches
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,

    /// Micro-batch size
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            id_column: default_id_column(),
            timestamp_column: default_timestamp_column(),
            batch_size: default_batch_size(),
        }
    }
}

impl SourceConfig {
    /// Reject names that cannot be spliced into SQL as bare identifiers
    pub fn validate(&self) -> Result<()> {
        for name in [&self.table, &self.id_column, &self.timestamp_column] {
            if !is_valid_identifier(name) {
                return Err(Error::Config(format!("Invalid SQL identifier: {:?}", name)));
            }
        }
        if self.batch_size <= 0 {
            return Err(Error::Config(format!(
                "source.batch_size must be positive, got {}",
                self.batch_size
            )));
        }
        Ok(())
    }
}

/// Locations of the documents and artifact store (relative to the root folder)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub schema: Option<PathBuf>,
    #[serde(default)]
    pub training: Option<PathBuf>,
    #[serde(default)]
    pub models: Option<PathBuf>,
    #[serde(default)]
    pub events: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_table() -> String {
    "customer_7day_summary".to_string()
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_timestamp_column() -> String {
    "created_at".to_string()
}

fn default_batch_size() -> i64 {
    DEFAULT_BATCH_SIZE
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5740
}

/// Only alphanumerics and underscore, not starting with a digit
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() < 100
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

impl TomlConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.source.validate()?;
        Ok(config)
    }

    /// Load configuration following the priority order in the module docs.
    ///
    /// An explicitly named file (CLI or environment) must exist; the
    /// platform default is optional and falls back to compiled defaults.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let explicit = cli_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

        if let Some(path) = explicit {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Read config {} failed: {}", path.display(), e))
            })?;
            return Self::from_toml_str(&content);
        }

        match default_config_file() {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                Self::from_toml_str(&content)
            }
            _ => {
                warn!("No configuration file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }

    /// Resolve the root folder (CLI → ENV → TOML → OS default)
    pub fn resolve_root_folder(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.root_folder {
            return path.clone();
        }

        default_root_folder()
    }

    /// Resolve every derived path against the root folder
    pub fn layout(&self, root: &Path) -> Layout {
        let under_root = |configured: &Option<PathBuf>, default: &str| match configured {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.join(default),
        };

        Layout {
            root: root.to_path_buf(),
            database: under_root(&self.database.path, "spendcast.db"),
            schema: under_root(&self.paths.schema, "config/schema.toml"),
            training: under_root(&self.paths.training, "config/training.toml"),
            models: under_root(&self.paths.models, "models"),
            events: under_root(&self.paths.events, "logs/events.jsonl"),
        }
    }
}

/// Concrete filesystem locations derived from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub database: PathBuf,
    pub schema: PathBuf,
    pub training: PathBuf,
    pub models: PathBuf,
    pub events: PathBuf,
}

impl Layout {
    /// Create the root folder and the parents of every file location
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.models)?;
        for file in [&self.database, &self.events] {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Platform config file location, if the platform has a config directory
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("spendcast").join("config.toml"))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/spendcast (or /var/lib/spendcast for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("spendcast"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/spendcast"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("spendcast"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/spendcast"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("spendcast"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\spendcast"))
    } else {
        PathBuf::from("./spendcast_data")
    }
}
