//! Configuration management for CLI, environment variables, and config files.

use crate::error::{PageviewsError, ValidationIssue};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the pageviews client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub coalesce: CoalesceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the views API connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Configuration for the local count cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Freshness window in seconds
    pub ttl_secs: u64,
    /// Directory for the durable cache; platform cache dir when unset
    pub storage_dir: Option<PathBuf>,
}

/// Configuration for batch-read coalescing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoalesceConfig {
    /// Quiet period before a flush, in milliseconds
    pub debounce_ms: u64,
}

/// Configuration for logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
            username: None,
            password: None,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            storage_dir: None,
        }
    }
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        Self { debounce_ms: 50 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ApiConfig {
    /// Basic-auth pair, present only when both halves are configured.
    pub fn auth_credentials(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &PathBuf) -> Result<Self, PageviewsError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| PageviewsError::IoError(e.to_string()))?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| PageviewsError::ParseError(e.to_string())),
            _ => toml::from_str(&content).map_err(|e| PageviewsError::ParseError(e.to_string())),
        }
    }

    pub fn from_default_locations() -> Result<Self, PageviewsError> {
        let config_dirs = [
            dirs::config_dir().map(|d| d.join("pageviews/config.toml")),
            Some(PathBuf::from("/etc/pageviews/config.toml")),
            Some(PathBuf::from("./pageviews.toml")),
        ];

        for path in config_dirs.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    pub fn merge_from_env(mut self) -> Result<Self, PageviewsError> {
        if let Ok(val) = std::env::var("PAGEVIEWS_API_URL") {
            self.api.url = val;
        }
        if let Ok(val) = std::env::var("PAGEVIEWS_CACHE_TTL") {
            self.cache.ttl_secs = val.parse().map_err(|_| {
                PageviewsError::InvalidArgument("PAGEVIEWS_CACHE_TTL has invalid format".into())
            })?;
        }
        if let Ok(val) = std::env::var("PAGEVIEWS_STORAGE_DIR") {
            self.cache.storage_dir = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("PAGEVIEWS_DEBOUNCE_MS") {
            self.coalesce.debounce_ms = val.parse().map_err(|_| {
                PageviewsError::InvalidArgument("PAGEVIEWS_DEBOUNCE_MS has invalid format".into())
            })?;
        }
        if let Ok(val) = std::env::var("PAGEVIEWS_LOG_LEVEL") {
            self.logging.level = val;
        }

        // Auth credentials - support both individual fields and combined format
        if let Ok(auth_str) = std::env::var("PAGEVIEWS_AUTH_USERPASS") {
            // Combined format: "username:password"
            if let Some((username, password)) = auth_str.split_once(':') {
                self.api.username = Some(username.to_string());
                self.api.password = Some(password.to_string());
            }
        } else {
            // Individual fields
            if let Ok(val) = std::env::var("PAGEVIEWS_AUTH_USERNAME") {
                self.api.username = Some(val);
            }
            if let Ok(val) = std::env::var("PAGEVIEWS_AUTH_PASSWORD") {
                self.api.password = Some(val);
            }
        }

        Ok(self)
    }

    pub fn merge_from_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(ref url) = cli.api_url {
            self.api.url = url.clone();
        }

        if let Some(ttl) = cli.cache_ttl {
            self.cache.ttl_secs = ttl;
        }

        if let Some(ref dir) = cli.storage_dir {
            self.cache.storage_dir = Some(dir.clone());
        }

        if let Some(ref username) = cli.username {
            self.api.username = Some(username.clone());
        }

        if let Some(ref password) = cli.password {
            self.api.password = Some(password.clone());
        }

        self
    }

    pub fn load() -> Result<Self, PageviewsError> {
        Self::from_default_locations()?.merge_from_env()
    }

    pub fn load_with_cli(cli: &CliArgs) -> Result<Self, PageviewsError> {
        let base = match &cli.config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::from_default_locations()?,
        };
        Ok(base.merge_from_env()?.merge_from_cli(cli))
    }

    pub fn validate(&self) -> Result<(), PageviewsError> {
        let mut issues = Vec::new();

        if self.api.url.is_empty() {
            issues.push(ValidationIssue {
                field: "api.url".to_string(),
                message: "URL cannot be empty".to_string(),
            });
        } else if let Err(e) = reqwest::Url::parse(&self.api.url) {
            issues.push(ValidationIssue {
                field: "api.url".to_string(),
                message: format!("Invalid URL format: {}", e),
            });
        }

        if self.cache.ttl_secs == 0 {
            issues.push(ValidationIssue {
                field: "cache.ttl_secs".to_string(),
                message: "Freshness window must be at least one second".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            issues.push(ValidationIssue {
                field: "logging.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(PageviewsError::ValidationError(issues))
        }
    }
}

/// Command-line arguments that override configuration values.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub api_url: Option<String>,
    pub config_file: Option<PathBuf>,
    pub cache_ttl: Option<u64>,
    pub storage_dir: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
}
