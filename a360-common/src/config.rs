//! Configuration loading and config-file resolution
//!
//! Bootstrap configuration for the watcher. Paths are mandatory; everything else has a
//! built-in default. Files may be TOML (`a360.toml`) or JSON (`a360.config.json`); the
//! JSON form keeps the camelCase keys used by the UI tooling, so every field accepts both
//! spellings.
//!
//! # Resolution priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`A360_CONFIG_PATH`)
//! 3. `./a360.toml`, then `./a360.config.json`
//! 4. Platform config directory (`<config_dir>/a360/a360.toml`)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "A360_CONFIG_PATH";

/// Watcher bootstrap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Archive root; subject base paths are relative to this folder
    #[serde(alias = "projectRoot")]
    pub project_root: PathBuf,

    /// Ledger workbook (Subjects / Images / Prompts_Auto sheets)
    #[serde(alias = "excelPath")]
    pub excel_path: PathBuf,

    /// Directory the generator writes new images into (watched, non-recursive)
    #[serde(alias = "comfyOutputDir")]
    pub comfy_output_dir: PathBuf,

    /// Timeline code stored in the ledger (e.g. "A")
    #[serde(default = "default_timeline_code", alias = "timelineCode")]
    pub timeline_code: String,

    /// Archive subfolder for the timeline (e.g. "TimelineA")
    #[serde(default = "default_timeline_folder_name", alias = "timelineFolderName")]
    pub timeline_folder_name: String,

    /// Label written to SourceModelTool for generated ages
    #[serde(default = "default_source_model_tool", alias = "sourceModelTool")]
    pub source_model_tool: String,

    /// Push channel bind host
    #[serde(default = "default_ws_host", alias = "wsHost")]
    pub ws_host: String,

    /// Push channel bind port
    #[serde(default = "default_ws_port", alias = "wsPort")]
    pub ws_port: u16,

    /// Append one dataset-index line per successful ingest
    #[serde(default = "default_true", alias = "writeDatasetIndex")]
    pub write_dataset_index: bool,

    /// Compute SHA-256 of stored images
    #[serde(default = "default_true", alias = "hashImages")]
    pub hash_images: bool,

    /// Dataset index location (defaults to `{project_root}/dataset_index.jsonl`)
    #[serde(default, alias = "datasetIndexPath")]
    pub dataset_index_path: Option<PathBuf>,

    /// Append every status event to the event log
    #[serde(default = "default_true", alias = "writeEventLog")]
    pub write_event_log: bool,

    /// Event log location (defaults to `{project_root}/event_log.jsonl`)
    #[serde(default, alias = "eventLogPath")]
    pub event_log_path: Option<PathBuf>,

    /// Stability check timeout in milliseconds
    #[serde(default = "default_stability_timeout_ms", alias = "stabilityTimeoutMs")]
    pub stability_timeout_ms: u64,

    /// Stability check poll interval in milliseconds
    #[serde(default = "default_stability_interval_ms", alias = "stabilityIntervalMs")]
    pub stability_interval_ms: u64,

    /// Extension (without dot) of ingestible images
    #[serde(default = "default_image_extension", alias = "imageExtension")]
    pub image_extension: String,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_timeline_code() -> String {
    "A".to_string()
}

fn default_timeline_folder_name() -> String {
    "TimelineA".to_string()
}

fn default_source_model_tool() -> String {
    "ComfyUI".to_string()
}

fn default_ws_host() -> String {
    "127.0.0.1".to_string()
}

fn default_ws_port() -> u16 {
    8765
}

fn default_true() -> bool {
    true
}

fn default_stability_timeout_ms() -> u64 {
    10_000
}

fn default_stability_interval_ms() -> u64 {
    200
}

fn default_image_extension() -> String {
    "png".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl WatcherConfig {
    /// Minimal config with defaults for everything but the three paths
    pub fn new(
        project_root: impl Into<PathBuf>,
        excel_path: impl Into<PathBuf>,
        comfy_output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            excel_path: excel_path.into(),
            comfy_output_dir: comfy_output_dir.into(),
            timeline_code: default_timeline_code(),
            timeline_folder_name: default_timeline_folder_name(),
            source_model_tool: default_source_model_tool(),
            ws_host: default_ws_host(),
            ws_port: default_ws_port(),
            write_dataset_index: true,
            hash_images: true,
            dataset_index_path: None,
            write_event_log: true,
            event_log_path: None,
            stability_timeout_ms: default_stability_timeout_ms(),
            stability_interval_ms: default_stability_interval_ms(),
            image_extension: default_image_extension(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load a config file, picking the format from its extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read config {} failed: {}", path.display(), e)))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config: WatcherConfig = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };

        Ok(config.normalized())
    }

    /// Trim string settings and fall back to defaults for blank values
    pub fn normalized(mut self) -> Self {
        fn or_default(value: &str, default: fn() -> String) -> String {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                default()
            } else {
                trimmed.to_string()
            }
        }

        self.timeline_code = or_default(&self.timeline_code, default_timeline_code);
        self.timeline_folder_name =
            or_default(&self.timeline_folder_name, default_timeline_folder_name);
        self.image_extension = or_default(
            self.image_extension.trim_start_matches('.'),
            default_image_extension,
        )
        .to_ascii_lowercase();
        self.dataset_index_path = self
            .dataset_index_path
            .filter(|p| !p.as_os_str().is_empty());
        self.event_log_path = self.event_log_path.filter(|p| !p.as_os_str().is_empty());
        self
    }

    /// Resolved dataset index path
    pub fn dataset_index_path(&self) -> PathBuf {
        self.dataset_index_path
            .clone()
            .unwrap_or_else(|| self.project_root.join("dataset_index.jsonl"))
    }

    /// Resolved event log path
    pub fn event_log_path(&self) -> PathBuf {
        self.event_log_path
            .clone()
            .unwrap_or_else(|| self.project_root.join("event_log.jsonl"))
    }

    pub fn stability_timeout(&self) -> Duration {
        crate::time::millis_to_duration(self.stability_timeout_ms)
    }

    pub fn stability_interval(&self) -> Duration {
        crate::time::millis_to_duration(self.stability_interval_ms)
    }

    /// Push channel bind address (`host:port`)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.ws_host, self.ws_port)
    }

    /// Check the paths that must exist before the watcher may start
    ///
    /// A missing ledger or watched directory is fatal. A missing archive root only warns;
    /// subject folders are created on demand.
    pub fn validate_startup_paths(&self) -> Result<()> {
        if !self.excel_path.exists() {
            return Err(Error::Config(format!(
                "Ledger workbook not found: {}",
                self.excel_path.display()
            )));
        }
        if !self.comfy_output_dir.is_dir() {
            return Err(Error::Config(format!(
                "Watched output directory not found: {}",
                self.comfy_output_dir.display()
            )));
        }
        if !self.project_root.exists() {
            warn!(
                "Archive root does not exist yet: {} (folders will be created as needed)",
                self.project_root.display()
            );
        }
        Ok(())
    }
}

/// Locates the config file following the resolution priority above
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
    search_dir: PathBuf,
}

impl ConfigResolver {
    /// Resolver searching the current working directory
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        let search_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            cli_path,
            search_dir,
        }
    }

    /// Override the directory searched for default file names
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dir = dir.into();
        self
    }

    /// Find the config file to load
    pub fn resolve(&self) -> Result<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            debug!("Config from command line: {}", path.display());
            return Ok(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                debug!("Config from {}: {}", CONFIG_ENV_VAR, path);
                return Ok(PathBuf::from(path));
            }
        }

        // Priority 3: Working directory
        for name in ["a360.toml", "a360.config.json"] {
            let candidate = self.search_dir.join(name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        // Priority 4: Platform config directory
        if let Some(candidate) = dirs::config_dir().map(|d| d.join("a360").join("a360.toml")) {
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        Err(Error::Config(format!(
            "Could not find a360.toml or a360.config.json. Set {} or pass --config.",
            CONFIG_ENV_VAR
        )))
    }

    /// Resolve and load the config
    pub fn load(&self) -> Result<WatcherConfig> {
        let path = self.resolve()?;
        let config = WatcherConfig::from_path(&path)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}
