//! Configuration loading and resolution
//!
//! Bootstrap configuration comes from a single TOML file. The file is
//! located in priority order:
//! 1. Command-line argument (highest priority)
//! 2. `PVAC_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/pvac/config.toml` on Linux)
//! 4. Compiled defaults (no file)
//!
//! A missing file at step 3 is not an error: the defaults are used and a
//! warning is logged. A file named explicitly at step 1 or 2 must exist.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PVAC_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Directory exported product results are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Maximum number of per-image analyses in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Whether validated per-image results are cached in memory
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// Vision provider: "mock", "openai" or "gemini"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// OpenAI provider settings (optional)
    #[serde(default)]
    pub openai: ProviderConfig,

    /// Gemini provider settings (optional)
    #[serde(default)]
    pub gemini: ProviderConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Per-provider settings for remote vision backends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (environment variables take priority)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model override
    #[serde(default)]
    pub model: Option<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_concurrency() -> usize {
    5
}

fn default_cache_enabled() -> bool {
    true
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            concurrency: default_concurrency(),
            cache_enabled: default_cache_enabled(),
            provider: default_provider(),
            logging: LoggingConfig::default(),
            openai: ProviderConfig::default(),
            gemini: ProviderConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Concurrency limit with non-positive values replaced by the default
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            default_concurrency()
        } else {
            self.concurrency
        }
    }
}

/// Get the platform default config file path
///
/// Linux: `~/.config/pvac/config.toml`, falling back to `/etc/pvac/config.toml`
/// when only the system-wide file exists.
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("pvac").join("config.toml"));

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/pvac/config.toml");
        match &user_config {
            Some(path) if path.exists() => return user_config,
            _ if system_config.exists() => return Some(system_config),
            _ => {}
        }
    }

    user_config
}

/// Resolve which config file to read, if any
///
/// Returns the path together with whether it was named explicitly
/// (CLI argument or environment variable).
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<(PathBuf, bool)> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some((path.to_path_buf(), true));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some((PathBuf::from(path), true));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().map(|p| (p, false))
}

/// Load configuration following the resolution order
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some((path, explicit)) = resolve_config_path(cli_arg) else {
        warn!("Could not determine config directory, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        if explicit {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        warn!(
            "Config file {} not found, using compiled defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config = TomlConfig::from_toml_str(&content)?;
    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

/// Write configuration to a TOML file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    // Sibling temp file, then rename
    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
