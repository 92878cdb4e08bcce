//! The single source of truth for pipeline configuration.
//!
//! A `DrpConfig` is created once at the application boundary (the CLI's
//! `--config` file) and then passed down through the system via a shared,
//! read-only `Arc<DrpConfig>`. Logging is initialized from it exactly once
//! per process.

use crate::error::DrpError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Data-directory roots for raw, intermediate, and reference products.
/// Retention and aging of these directories is owned by external housekeeping
/// scripts, not the core.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DataDirs {
    #[serde(default)]
    pub raw: Option<PathBuf>,
    #[serde(default)]
    pub intermediate: Option<PathBuf>,
    #[serde(default)]
    pub reference: Option<PathBuf>,
}

/// The unified pipeline configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DrpConfig {
    /// Log filter level: `error`, `warn`, `info`, `debug`, or `trace`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// If set, log lines are appended to this file instead of stderr.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// If true, the filter level is forced to `debug` regardless of
    /// `log_level`.
    #[serde(default)]
    pub log_verbose: bool,

    /// Canonical output location for recipe products. Only fully successful
    /// runs write here.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Scratch location for partial products of an aborted run. Nothing is
    /// quarantined when unset.
    #[serde(default)]
    pub quarantine_dir: Option<PathBuf>,

    /// Data-directory roots read by worker processes.
    #[serde(default)]
    pub data_dirs: DataDirs,
}

impl Default for DrpConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_path: None,
            log_verbose: false,
            output_dir: default_output_dir(),
            quarantine_dir: None,
            data_dirs: DataDirs::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl DrpConfig {
    /// Loads configuration from a JSON file. Any parse failure is a
    /// `Configuration` error, never a partially applied config.
    pub fn from_file(path: &Path) -> Result<Self, DrpError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DrpError::Configuration(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, DrpError> {
        serde_json::from_str(raw)
            .map_err(|e| DrpError::Configuration(format!("malformed config: {}", e)))
    }

    /// The effective log filter after applying `log_verbose`.
    pub fn effective_log_level(&self) -> log::LevelFilter {
        if self.log_verbose {
            return log::LevelFilter::Debug;
        }
        match self.log_level.to_ascii_lowercase().as_str() {
            "error" => log::LevelFilter::Error,
            "warn" => log::LevelFilter::Warn,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }

    /// Initializes the process-wide logger from this configuration. Safe to
    /// call once per process; later calls are ignored by `env_logger`.
    pub fn init_logging(&self) -> Result<(), DrpError> {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(self.effective_log_level());
        if let Some(path) = &self.log_path {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        // try_init instead of init: tests and embedding hosts may have set a
        // logger already.
        let _ = builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args())).try_init();
        Ok(())
    }
}
