use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CleanerError, Result};

/// Largest page Gmail's `messages.list` returns
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_token_cache_path")]
    pub token_cache_path: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            token_cache_path: default_token_cache_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_age_days")]
    pub default_age_days: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            default_age_days: default_age_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            preview_limit: default_preview_limit(),
        }
    }
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_token_cache_path() -> PathBuf {
    PathBuf::from(".gmail-cleaner/token.json")
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_results() -> u32 {
    MAX_PAGE_SIZE
}

fn default_max_concurrent_fetches() -> usize {
    10
}

fn default_age_days() -> u32 {
    30
}

fn default_preview_limit() -> usize {
    20
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CleanerError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| CleanerError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    CleanerError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CleanerError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| CleanerError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api.request_timeout_secs == 0 || self.api.request_timeout_secs > 300 {
            return Err(CleanerError::ConfigError(
                "api.request_timeout_secs must be between 1 and 300".to_string(),
            ));
        }

        if self.scan.max_results == 0 {
            return Err(CleanerError::ConfigError(
                "scan.max_results must be at least 1".to_string(),
            ));
        }
        if self.scan.max_results > MAX_PAGE_SIZE {
            return Err(CleanerError::ConfigError(format!(
                "scan.max_results cannot exceed {} (Gmail page size limit)",
                MAX_PAGE_SIZE
            )));
        }

        if self.scan.max_concurrent_fetches == 0 {
            return Err(CleanerError::ConfigError(
                "scan.max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.scan.max_concurrent_fetches > 100 {
            return Err(CleanerError::ConfigError(
                "scan.max_concurrent_fetches cannot exceed 100".to_string(),
            ));
        }

        if self.display.preview_limit == 0 {
            return Err(CleanerError::ConfigError(
                "display.preview_limit must be at least 1".to_string(),
            ));
        }

        if self.auth.token_cache_path.as_os_str().is_empty() {
            return Err(CleanerError::ConfigError(
                "auth.token_cache_path cannot be empty".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
