//! Configuration loading for the STRATA posts client.
//!
//! All fields are required unless explicitly marked optional. No defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use strata_cache::CacheConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub cache: CacheSection,
    /// `tracing` filter directive; `RUST_LOG` wins when set.
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    pub keep_unused_for_secs: u64,
    pub eviction_interval_secs: u64,
    pub refetch_on_invalidate: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or STRATA_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.eviction_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.eviction_interval_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if let Some(filter) = &self.log_filter {
            if filter.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "log_filter",
                    reason: "must not be empty when set".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_keep_unused_for(Duration::from_secs(self.cache.keep_unused_for_secs))
            .with_eviction_interval(Duration::from_secs(self.cache.eviction_interval_secs))
            .with_refetch_on_invalidate(self.cache.refetch_on_invalidate)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("STRATA_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
