//! Configuration module for the live preview pipeline.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides (applied by the caller)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `LIVEPDF_` and use double underscores
//! to separate nested levels:
//! - `LIVEPDF_WATCH__DEBOUNCE_MS=250` sets `watch.debounce_ms`
//! - `LIVEPDF_CACHE__ARTIFACT_MAX_AGE_DAYS=7` sets `cache.artifact_max_age_days`
//! - `LIVEPDF_RENDERER__PROGRAM=libreoffice` sets `renderer.program`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "livepdf.toml";

const ENV_PREFIX: &str = "LIVEPDF_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Artifact cache and persisted state locations
    #[serde(default)]
    pub cache: CacheConfig,

    /// Change detection settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// External renderer invocation
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Root directory; artifacts live in `artifacts/`, records in `state/`
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Artifacts whose file is older than this are removed by `sweep`
    #[serde(default = "default_artifact_max_age_days")]
    pub artifact_max_age_days: u64,

    /// Calendar months a selection record stays valid after its last write
    #[serde(default = "default_selection_expiry_months")]
    pub selection_expiry_months: u32,

    /// Calendar months a session record stays valid after its last write
    #[serde(default = "default_session_expiry_months")]
    pub session_expiry_months: u32,

    /// Maximum number of directories kept in the history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Quiet period before a burst of events is considered settled
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Interval of the mtime polling fallback
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Regenerate automatically when watched files change
    #[serde(default = "default_true")]
    pub auto_update: bool,

    /// Consecutive watcher errors before the watcher is reported as degraded
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RendererConfig {
    /// Converter executable
    #[serde(default = "default_renderer_program")]
    pub program: String,

    /// Arguments; `{input}`, `{outdir}` and `{selection}` are substituted per call.
    /// Sheet selections are refused unless `{selection}` appears.
    #[serde(default = "default_renderer_args")]
    pub args: Vec<String>,

    /// Upper bound for a single conversion
    #[serde(default = "default_renderer_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every target (`error`, `warn`, `info`, `debug`, `trace`)
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `livepdf::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("livepdf")
}
fn default_artifact_max_age_days() -> u64 {
    30
}
fn default_selection_expiry_months() -> u32 {
    1
}
fn default_session_expiry_months() -> u32 {
    3
}
fn default_history_limit() -> usize {
    20
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_true() -> bool {
    true
}
fn default_error_threshold() -> u32 {
    3
}
fn default_renderer_program() -> String {
    "soffice".to_string()
}
fn default_renderer_args() -> Vec<String> {
    ["--headless", "--convert-to", "pdf", "--outdir", "{outdir}", "{input}"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_renderer_timeout_secs() -> u64 {
    120
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            cache: CacheConfig::default(),
            watch: WatchConfig::default(),
            renderer: RendererConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            artifact_max_age_days: default_artifact_max_age_days(),
            selection_expiry_months: default_selection_expiry_months(),
            session_expiry_months: default_session_expiry_months(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            auto_update: true,
            error_threshold: default_error_threshold(),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: default_renderer_program(),
            args: default_renderer_args(),
            timeout_secs: default_renderer_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Directory holding generated PDFs and the cache manifest.
    pub fn artifact_dir(&self) -> PathBuf {
        self.dir.join("artifacts")
    }

    /// Directory holding selection, session and history records.
    pub fn state_dir(&self) -> PathBuf {
        self.dir.join("state")
    }

    pub fn artifact_max_age(&self) -> Duration {
        Duration::from_secs(self.artifact_max_age_days * 24 * 60 * 60)
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::config_path().unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels, single underscore
            // stays part of the field name
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Default location of the configuration file
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("livepdf").join(CONFIG_FILE_NAME))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file
    pub fn init_config_file(
        path: impl AsRef<Path>,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = path.as_ref().to_path_buf();

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}
