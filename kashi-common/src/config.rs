//! Configuration loading and scratch folder resolution
//!
//! Bootstrap settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG: &str = "KASHI_CONFIG";
pub const ENV_HOST: &str = "KASHI_HOST";
pub const ENV_PORT: &str = "KASHI_PORT";
pub const ENV_SCRATCH_DIR: &str = "KASHI_SCRATCH_DIR";
pub const ENV_LOG_LEVEL: &str = "KASHI_LOG_LEVEL";

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional in the file; missing values fall back to
/// compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Directory holding per-request temporary artifacts
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
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

/// External tool locations
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    /// Audio-normalization tool
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    /// TTS engine the aligner depends on
    #[serde(default = "default_espeak")]
    pub espeak: String,

    /// Interpreter hosting the aeneas aligner
    #[serde(default = "default_python")]
    pub python: String,

    /// Aligner task language
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            espeak: default_espeak(),
            python: default_python(),
            language: default_language(),
        }
    }
}

/// Per-stage time limits, in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_fetch_secs")]
    pub fetch_secs: u64,

    #[serde(default = "default_normalize_secs")]
    pub normalize_secs: u64,

    #[serde(default = "default_align_secs")]
    pub align_secs: u64,

    #[serde(default = "default_preflight_secs")]
    pub preflight_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            fetch_secs: default_fetch_secs(),
            normalize_secs: default_normalize_secs(),
            align_secs: default_align_secs(),
            preflight_secs: default_preflight_secs(),
        }
    }
}

impl TimeoutsConfig {
    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    pub fn normalize(&self) -> Duration {
        Duration::from_secs(self.normalize_secs)
    }

    pub fn align(&self) -> Duration {
        Duration::from_secs(self.align_secs)
    }

    pub fn preflight(&self) -> Duration {
        Duration::from_secs(self.preflight_secs)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_espeak() -> String {
    "espeak-ng".to_string()
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_language() -> String {
    "jpn".to_string()
}

fn default_fetch_secs() -> u64 {
    120
}

fn default_normalize_secs() -> u64 {
    300
}

fn default_align_secs() -> u64 {
    600
}

fn default_preflight_secs() -> u64 {
    5
}

/// Default scratch folder: `<system temp>/<module>`
pub fn default_scratch_dir(module_name: &str) -> PathBuf {
    std::env::temp_dir().join(module_name)
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub scratch_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub scratch_dir: PathBuf,
    pub log_level: String,
    pub tools: ToolsConfig,
    pub timeouts: TimeoutsConfig,
}

impl ServiceConfig {
    /// Resolve configuration for `module_name` from CLI, environment, TOML and defaults
    pub fn resolve(module_name: &str, cli: CliOverrides) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from));
        let toml = load_toml_config(module_name, config_path.as_deref())?;
        Self::merge(module_name, cli, toml)
    }

    /// Merge already-loaded TOML settings with CLI and environment overrides
    pub fn merge(module_name: &str, cli: CliOverrides, toml: TomlConfig) -> Result<Self> {
        let host = cli
            .host
            .or_else(|| env_string(ENV_HOST))
            .or(toml.host)
            .unwrap_or_else(default_host);

        let port = match cli.port {
            Some(port) => port,
            None => match env_string(ENV_PORT) {
                Some(raw) => raw.parse::<u16>().map_err(|e| {
                    Error::Config(format!("{} must be a port number, got '{}': {}", ENV_PORT, raw, e))
                })?,
                None => toml.port.unwrap_or_else(default_port),
            },
        };

        let scratch_dir = cli
            .scratch_dir
            .or_else(|| env_string(ENV_SCRATCH_DIR).map(PathBuf::from))
            .or(toml.scratch_dir)
            .unwrap_or_else(|| default_scratch_dir(module_name));

        let log_level = cli
            .log_level
            .or_else(|| env_string(ENV_LOG_LEVEL))
            .unwrap_or(toml.logging.level);

        Ok(Self {
            host,
            port,
            scratch_dir,
            log_level,
            tools: toml.tools,
            timeouts: toml.timeouts,
        })
    }

    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load the TOML config file
///
/// An explicit path must exist. Without one, the platform config locations
/// are searched; if none is present, defaults are used with a warning.
pub fn load_toml_config(module_name: &str, explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match find_config_file(module_name) {
            Some(path) => path,
            None => {
                warn!("No config file found for {}, using defaults", module_name);
                return Ok(TomlConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config = toml::from_str::<TomlConfig>(&content).map_err(|source| Error::TomlParse {
        path: path.display().to_string(),
        source,
    })?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Search the platform config locations for `<module>.toml`
fn find_config_file(module_name: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", module_name);

    let user_config = dirs::config_dir().map(|d| d.join("kashi").join(&file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/kashi").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Create the scratch folder if missing and confirm it is a directory
pub fn ensure_scratch_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        info!("Creating scratch directory: {}", path.display());
        std::fs::create_dir_all(path)?;
    }

    if !path.is_dir() {
        return Err(Error::Config(format!(
            "Scratch path is not a directory: {}",
            path.display()
        )));
    }

    Ok(())
}
