//! Server configuration
//!
//! Read from a TOML file (`--config`, else `<data_dir>/config.toml`). Every
//! field has a default, so a missing file or a partial file is fine:
//!
//! ```toml
//! listen = "127.0.0.1:8088"
//! request_timeout_secs = 10
//!
//! [search]
//! engine = "ripgrep"
//! zoekt_url = "http://localhost:6070"
//!
//! [cache]
//! ttl_secs = 300
//!
//! [logging]
//! level = "debug"
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CodeBrowserError, Result};
use crate::search::EngineKind;

/// Name of the config file inside the data directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Data directory (registry database, per-repo index files)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// HTTP listen address
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Per-request deadline
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Content search settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Which engine backs content search and the fallback
    #[serde(default = "default_engine")]
    pub engine: EngineKind,

    /// zoekt-webserver base URL
    #[serde(default = "default_zoekt_url")]
    pub zoekt_url: String,

    /// Outbound timeout for zoekt calls
    #[serde(default = "default_zoekt_timeout_secs")]
    pub zoekt_timeout_secs: u64,

    /// `TotalMaxMatchCount` sent to zoekt
    #[serde(default = "default_max_match_count")]
    pub max_match_count: usize,

    /// ripgrep executable (name on PATH or absolute path)
    #[serde(default = "default_rg_binary")]
    pub rg_binary: PathBuf,

    /// Per-file match cap passed as `rg -m`
    #[serde(default = "default_rg_max_count")]
    pub rg_max_count: usize,
}

/// Response cache for tree listings, blobs, and search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime; 0 disables the cache
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Upper bound on the approximate size of all cached entries
    #[serde(default = "default_cache_max_bytes")]
    pub max_bytes: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8088))
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_engine() -> EngineKind {
    EngineKind::Zoekt
}

fn default_zoekt_url() -> String {
    "http://localhost:6070".to_string()
}

fn default_zoekt_timeout_secs() -> u64 {
    10
}

fn default_max_match_count() -> usize {
    1000
}

fn default_rg_binary() -> PathBuf {
    PathBuf::from("rg")
}

fn default_rg_max_count() -> usize {
    100
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_max_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            listen: default_listen(),
            request_timeout_secs: default_request_timeout_secs(),
            search: SearchConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            zoekt_url: default_zoekt_url(),
            zoekt_timeout_secs: default_zoekt_timeout_secs(),
            max_match_count: default_max_match_count(),
            rg_binary: default_rg_binary(),
            rg_max_count: default_rg_max_count(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            max_bytes: default_cache_max_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Platform data directory, or `./.data` when the platform has none
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("code-browser"))
        .unwrap_or_else(|| PathBuf::from(".data"))
}

impl ServerConfig {
    /// Load configuration from a specific path
    ///
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| CodeBrowserError::Config {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| CodeBrowserError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolved data directory
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(config_error("request_timeout_secs must be greater than 0"));
        }
        if self.search.zoekt_timeout_secs == 0 {
            return Err(config_error("search.zoekt_timeout_secs must be greater than 0"));
        }
        if !self.search.zoekt_url.starts_with("http://")
            && !self.search.zoekt_url.starts_with("https://")
        {
            return Err(config_error(format!(
                "search.zoekt_url must be an http(s) URL, got {}",
                self.search.zoekt_url
            )));
        }
        if self.search.max_match_count == 0 || self.search.rg_max_count == 0 {
            return Err(config_error("search match limits must be greater than 0"));
        }
        if self.cache.ttl_secs > 0 && self.cache.max_bytes == 0 {
            return Err(config_error("cache.max_bytes must be greater than 0 when the cache is enabled"));
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(config_error(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Serialize as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CodeBrowserError::Config {
            message: format!("Failed to serialize config: {}", e),
        })
    }
}

fn config_error(message: impl Into<String>) -> CodeBrowserError {
    CodeBrowserError::Config {
        message: message.into(),
    }
}
