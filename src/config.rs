//! Configuration management for the weather service
//!
//! Handles loading configuration from an optional YAML file and environment
//! variables, keeps unknown top-level keys as passthrough fields, and
//! validates all settings before the server starts.

use crate::ServiceError;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "METEOPROXY_CONFIG";

const ENV_PREFIX: &str = "METEOPROXY";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const UPSTREAM_DEADLINE_MARGIN: Duration = Duration::from_secs(1);

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Interface the HTTP server binds to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the HTTP server listens on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Forces debug-level logging
    #[serde(default)]
    pub debug: bool,
    /// Upper bound for handling a single request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Upstream forecast provider
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Response cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Chart output
    #[serde(default)]
    pub chart: ChartConfig,
    /// Any other top-level key found in the configuration sources
    #[serde(flatten)]
    extra_fields: BTreeMap<String, ExtraValue>,
}

/// Upstream provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Forecast endpoint URL
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
    /// Per-attempt request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_seconds: u32,
    /// Retries after the first attempt for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry; doubles per attempt
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,
    /// Cap for a single backoff delay
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// User-Agent header sent upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory of the on-disk cache
    #[serde(default = "default_cache_path")]
    pub path: String,
    /// Cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Log every HTTP request/response passing through the router
    #[serde(default = "default_capture_http")]
    pub capture_http: bool,
}

/// Chart image settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_chart_width")]
    pub width: u32,
    #[serde(default = "default_chart_height")]
    pub height: u32,
}

/// Scalar value of a passthrough configuration key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ExtraValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtraValue::Bool(value) => write!(f, "{value}"),
            ExtraValue::Integer(value) => write!(f, "{value}"),
            ExtraValue::Float(value) => write!(f, "{value}"),
            ExtraValue::Text(value) => write!(f, "{value}"),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_forecast_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_upstream_timeout() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_min_ms() -> u64 {
    200
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    format!("meteoproxy/{}", crate::VERSION)
}

fn default_cache_path() -> String {
    ".cache".to_string()
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_capture_http() -> bool {
    true
}

fn default_chart_width() -> u32 {
    1000
}

fn default_chart_height() -> u32 {
    600
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            forecast_url: default_forecast_url(),
            timeout_seconds: default_upstream_timeout(),
            max_retries: default_max_retries(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            ttl_seconds: default_cache_ttl(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            capture_http: default_capture_http(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: default_chart_width(),
            height: default_chart_height(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
            request_timeout_seconds: default_request_timeout(),
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
            chart: ChartConfig::default(),
            extra_fields: BTreeMap::new(),
        }
    }
}

impl UpstreamConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.into())
    }

    #[must_use]
    pub fn backoff_bounds(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.backoff_min_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Settings {
    /// Load configuration from the default file location and environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load_from_path(path)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        match config_path {
            Some(path) => {
                builder = builder.add_source(
                    File::from(path.clone())
                        .required(true)
                        .format(FileFormat::Yaml),
                );
            }
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    builder = builder.add_source(
                        File::from(fallback)
                            .required(false)
                            .format(FileFormat::Yaml),
                    );
                }
            }
        }

        // Environment overrides, e.g. METEOPROXY_UPSTREAM__MAX_RETRIES=3
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: Settings = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        // METEOPROXY_CONFIG itself is picked up by the environment source
        config.extra_fields.remove("config");

        config.validate()?;

        Ok(config)
    }

    /// Address string the server binds to
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Budget for one upstream fetch including all retries; ends one second
    /// before the request timeout.
    #[must_use]
    pub fn upstream_deadline(&self) -> Duration {
        self.request_timeout().saturating_sub(UPSTREAM_DEADLINE_MARGIN)
    }

    /// Effective log level, taking the debug flag into account
    #[must_use]
    pub fn log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.logging.level
        }
    }

    /// Passthrough keys that are not part of the typed configuration
    #[must_use]
    pub fn extra_fields(&self) -> &BTreeMap<String, ExtraValue> {
        &self.extra_fields
    }

    /// Summary of the passthrough keys for diagnostics, `None` when there are none
    #[must_use]
    pub fn describe_extra_fields(&self) -> Option<String> {
        if self.extra_fields.is_empty() {
            return None;
        }
        let fields = self
            .extra_fields
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!("Extra fields found: {fields}"))
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ServiceError::config("Port must be greater than 0").into());
        }

        if !(2..=300).contains(&self.request_timeout_seconds) {
            return Err(
                ServiceError::config("Request timeout must be between 2 and 300 seconds").into(),
            );
        }

        if self.upstream.timeout_seconds == 0 || self.upstream.timeout_seconds > 300 {
            return Err(ServiceError::config(
                "Upstream timeout must be between 1 and 300 seconds",
            )
            .into());
        }

        if self.upstream.max_retries > 10 {
            return Err(ServiceError::config("Upstream max retries cannot exceed 10").into());
        }

        if self.upstream.backoff_min_ms > self.upstream.backoff_max_ms {
            return Err(ServiceError::config(
                "Upstream backoff_min_ms cannot exceed backoff_max_ms",
            )
            .into());
        }

        if self.cache.ttl_seconds > 7 * 24 * 60 * 60 {
            return Err(ServiceError::config("Cache TTL cannot exceed one week").into());
        }

        for (name, size) in [("width", self.chart.width), ("height", self.chart.height)] {
            if !(100..=4000).contains(&size) {
                return Err(ServiceError::config(format!(
                    "Chart {name} must be between 100 and 4000 pixels, got {size}"
                ))
                .into());
            }
        }

        Ok(())
    }

    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(ServiceError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(ServiceError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        let url = &self.upstream.forecast_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(
                ServiceError::config("Upstream forecast URL must be an HTTP or HTTPS URL").into(),
            );
        }

        if self.cache.path.trim().is_empty() {
            return Err(ServiceError::config("Cache path cannot be empty").into());
        }

        Ok(())
    }
}
