//! Configuration loading and data directory layout
//!
//! Settings come from a single TOML file read once at startup. A missing
//! file is not fatal: built-in defaults apply.
//!
//! Config file priority:
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`RELFORM_CONFIG`)
//! 3. `./relform.toml`
//! 4. `<user config dir>/relform/relform.toml`
//!
//! Data directory priority: `--data-dir`, `RELFORM_DATA_DIR`, TOML
//! `data_dir`, then `./data`.

use crate::ledger::encoding_for_label;
use crate::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const CONFIG_ENV_VAR: &str = "RELFORM_CONFIG";
pub const DATA_DIR_ENV_VAR: &str = "RELFORM_DATA_DIR";
const CONFIG_FILE_NAME: &str = "relform.toml";

/// Process configuration, immutable after startup
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root of ledger, counter, lock and images
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// HTTP listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// WHATWG label of the ledger charset
    #[serde(default = "default_ledger_encoding")]
    pub ledger_encoding: String,

    /// Bounded wait for the commit lock; absent waits indefinitely
    #[serde(default)]
    pub lock_timeout_secs: Option<u64>,

    /// Request body limit for form posts (bytes)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Age after which an unread confirmation is dropped
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Staff notification and submitter copy settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_notify_address")]
    pub to: String,
    #[serde(default = "default_notify_address")]
    pub from: String,
    /// Send a confirmation copy to the submitter's contact email
    #[serde(default)]
    pub send_copy: bool,
    #[serde(default = "default_notify_address")]
    pub copy_from: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    #[serde(default)]
    pub transport: TransportKind,
    /// Directory for `transport = "spool"`; defaults to `<data_dir>/outbox`
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            to: default_notify_address(),
            from: default_notify_address(),
            send_copy: false,
            copy_from: default_notify_address(),
            subject_prefix: default_subject_prefix(),
            transport: TransportKind::default(),
            spool_dir: None,
        }
    }
}

/// How notification messages leave the process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Write the rendered message to the log
    #[default]
    Log,
    /// Drop `.eml` files into a spool directory for an external mailer
    Spool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
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

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_bind() -> String {
    "127.0.0.1:4567".to_string()
}

fn default_ledger_encoding() -> String {
    "shift_jis".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_pending_ttl_secs() -> u64 {
    3600
}

fn default_notify_address() -> String {
    "vocalendar@vocalendar.jp".to_string()
}

fn default_subject_prefix() -> String {
    "[P-Rel]".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            bind: default_bind(),
            ledger_encoding: default_ledger_encoding(),
            lock_timeout_secs: None,
            max_upload_bytes: default_max_upload_bytes(),
            pending_ttl_secs: default_pending_ttl_secs(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Parse TOML text and check values that cannot be typed by serde
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read {} failed: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load configuration following the priority order in the module docs
    ///
    /// An explicitly requested file (CLI or environment) must exist; the
    /// implicit locations fall back to defaults. Runs before logging is set
    /// up, so the chosen source is returned for the caller to report.
    pub fn load(cli_path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        if let Some(path) = cli_path {
            return Ok((Self::from_file(path)?, ConfigSource::CommandLine(path.to_path_buf())));
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            return Ok((Self::from_file(&path)?, ConfigSource::Environment(path)));
        }
        for candidate in default_config_paths() {
            if candidate.exists() {
                return Ok((Self::from_file(&candidate)?, ConfigSource::Discovered(candidate)));
            }
        }
        Ok((Self::default(), ConfigSource::Defaults))
    }

    fn validate(&self) -> Result<()> {
        encoding_for_label(&self.ledger_encoding)?;
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".to_string()));
        }
        Ok(())
    }

    /// Settings that parse but have no effect
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.notify.send_copy && !self.notify.enabled {
            warnings.push("notify.send_copy has no effect while notify.enabled = false".to_string());
        }
        if self.notify.spool_dir.is_some() && self.notify.transport != TransportKind::Spool {
            warnings.push("notify.spool_dir is ignored unless notify.transport = \"spool\"".to_string());
        }
        warnings
    }

    /// Apply command-line and environment overrides of the data directory
    pub fn resolve_data_dir(&mut self, cli_arg: Option<PathBuf>) {
        if let Some(dir) = cli_arg {
            self.data_dir = dir;
        } else if let Ok(dir) = std::env::var(DATA_DIR_ENV_VAR) {
            self.data_dir = PathBuf::from(dir);
        }
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_secs.map(Duration::from_secs)
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir)
    }

    /// Spool directory for `transport = "spool"`
    pub fn spool_dir(&self) -> PathBuf {
        self.notify
            .spool_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("outbox"))
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    Discovered(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CommandLine(path) => write!(f, "{} (command line)", path.display()),
            ConfigSource::Environment(path) => write!(f, "{} ({})", path.display(), CONFIG_ENV_VAR),
            ConfigSource::Discovered(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => write!(f, "built-in defaults (no {} found)", CONFIG_FILE_NAME),
        }
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("relform").join(CONFIG_FILE_NAME));
    }
    paths
}

/// File locations inside the data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    pub root: PathBuf,
    pub ledger: PathBuf,
    pub sequence: PathBuf,
    pub lock: PathBuf,
    pub images: PathBuf,
    /// Spool for uploads in flight; same filesystem as `images`
    pub tmp: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            ledger: root.join("relinfo.csv"),
            sequence: root.join("seq"),
            lock: root.join("lock"),
            images: root.join("images"),
            tmp: root.join("tmp"),
            root,
        }
    }

    /// Create the data, images and upload spool directories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.root, &self.images, &self.tmp] {
            if !dir.exists() {
                info!("Creating directory {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }
}
