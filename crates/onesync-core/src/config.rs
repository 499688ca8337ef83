//! YAML configuration for the Graph data-plane
//!
//! Covers the API endpoint, retry backoff, upload thresholds, the delta page
//! ceiling and log output. Every section is optional in the file; missing
//! fields take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upload chunks (except the last) must be a multiple of this many bytes.
pub const CHUNK_ALIGNMENT: u64 = 320 * 1024;

/// Base URL for Microsoft Graph API v1.0
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for onesync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub graph: GraphConfig,
    pub retry: RetryConfig,
    pub upload: UploadConfig,
    pub delta: DeltaConfig,
    pub logging: LoggingConfig,
}

/// Graph endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// API root every relative path is appended to. Delta tokens must point here.
    pub base_url: String,
    /// Value of the `User-Agent` header sent on every request.
    pub user_agent: String,
}

/// Retry and backoff settings shared by every transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Backoff before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Multiplier applied per attempt.
    pub factor: u32,
    /// Ceiling for the computed backoff, in seconds. `Retry-After` is not capped.
    pub max_delay_secs: u64,
}

/// Upload engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Files up to this size use a single PUT.
    pub simple_upload_max_bytes: u64,
    /// Chunk size for resumable sessions; must be a multiple of 320 KiB.
    pub chunk_size_bytes: u64,
}

/// Delta query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    /// Upper bound on pages requested by a single `fetch_all`.
    pub max_pages: usize,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Reads and parses the YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], but any read or parse failure yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// `$XDG_CONFIG_HOME/onesync/config.yaml`, or the platform equivalent
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("onesync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            user_agent: concat!("onesync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
            factor: 2,
            max_delay_secs: 60,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            simple_upload_max_bytes: 4 * 1024 * 1024,
            chunk_size_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self { max_pages: 10_000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// One invalid configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"upload.chunk_size_bytes"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Checks every field and collects all problems; empty means valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- graph ---
        match url::Url::parse(&self.graph.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError {
                field: "graph.base_url".into(),
                message: format!("unsupported scheme '{}'", url.scheme()),
            }),
            Err(e) => errors.push(ValidationError {
                field: "graph.base_url".into(),
                message: format!("not a valid URL: {e}"),
            }),
        }
        if self.graph.user_agent.trim().is_empty() {
            errors.push(ValidationError {
                field: "graph.user_agent".into(),
                message: "must not be empty".into(),
            });
        }

        // --- retry ---
        if self.retry.base_delay_ms == 0 {
            errors.push(ValidationError {
                field: "retry.base_delay_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.retry.factor == 0 {
            errors.push(ValidationError {
                field: "retry.factor".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.retry.max_delay_secs == 0 {
            errors.push(ValidationError {
                field: "retry.max_delay_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- upload ---
        if self.upload.simple_upload_max_bytes == 0 {
            errors.push(ValidationError {
                field: "upload.simple_upload_max_bytes".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.upload.chunk_size_bytes == 0 {
            errors.push(ValidationError {
                field: "upload.chunk_size_bytes".into(),
                message: "must be greater than 0".into(),
            });
        } else if self.upload.chunk_size_bytes % CHUNK_ALIGNMENT != 0 {
            errors.push(ValidationError {
                field: "upload.chunk_size_bytes".into(),
                message: format!(
                    "must be a multiple of {CHUNK_ALIGNMENT} bytes (320 KiB), got {}",
                    self.upload.chunk_size_bytes
                ),
            });
        }

        // --- delta ---
        if self.delta.max_pages == 0 {
            errors.push(ValidationError {
                field: "delta.max_pages".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Programmatic [`Config`] construction, starting from the defaults.
///
/// # Example
///
/// ```rust,no_run
/// use onesync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .base_url("http://127.0.0.1:8080")
///     .retry_max_retries(2)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- graph ---

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.graph.base_url = url.into();
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.graph.user_agent = agent.into();
        self
    }

    // --- retry ---

    pub fn retry_max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self
    }

    pub fn retry_factor(mut self, factor: u32) -> Self {
        self.config.retry.factor = factor;
        self
    }

    pub fn retry_max_delay_secs(mut self, secs: u64) -> Self {
        self.config.retry.max_delay_secs = secs;
        self
    }

    // --- upload ---

    pub fn simple_upload_max_bytes(mut self, bytes: u64) -> Self {
        self.config.upload.simple_upload_max_bytes = bytes;
        self
    }

    pub fn chunk_size_bytes(mut self, bytes: u64) -> Self {
        self.config.upload.chunk_size_bytes = bytes;
        self
    }

    // --- delta ---

    pub fn delta_max_pages(mut self, pages: usize) -> Self {
        self.config.delta.max_pages = pages;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- build ---

    /// Returns the configuration without validating it.
    pub fn build(self) -> Config {
        self.config
    }

    /// Returns the configuration, or every validation error it has.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
