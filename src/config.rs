//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$ESINDEX_CONFIG` (environment variable)
//! 2. `~/.config/esindex/config.toml` (Linux/macOS)
//!    `%APPDATA%\esindex\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Persisted index settings.
    pub index: IndexConfig,
    /// In-memory cache settings.
    pub cache: CacheConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override the directory holding search indexes and logs.
    pub data_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Persisted index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Ciphertexts longer than this many base64 characters go to a side file.
    pub inline_content_limit: usize,
    /// Maximum on-disk size of one user's index (`None` = unlimited).
    pub storage_limit: Option<u64>,
    /// Indexing stops this many bytes before `storage_limit` is reached.
    pub storage_limit_margin: u64,
    /// Minimum free disk space required to keep indexing.
    pub low_storage_limit: u64,
    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

/// In-memory cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Fraction of available memory the decoded-message cache may use.
    pub heap_fraction: f64,
    /// Estimated in-memory size of one decoded message, in bytes.
    pub message_size_estimate: u64,
    /// Memory assumed available when the host cannot report it.
    pub memory_limit: u64,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            inline_content_limit: 64 * 1024,
            storage_limit: None,
            storage_limit_margin: 2_000,
            low_storage_limit: 100 * 1024 * 1024, // 100 MB
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            heap_fraction: 0.2,
            message_size_estimate: 14_000,
            memory_limit: 1024 * 1024 * 1024, // 1 GB
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("ESINDEX_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("esindex").join("config.toml"))
}

/// Return the private directory holding search indexes.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("esindex")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    data_dir(config).join("esindex.log")
}
