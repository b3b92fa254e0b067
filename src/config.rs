//! Configuration management for hikitsugi
//!
//! Settings are loaded from environment variables with sensible defaults.
//! Command-line flags override individual values after loading.
//!
//! # Environment Variables
//!
//! - `HIKITSUGI_SERVER_URL`: Server base URL - default: "http://localhost:8000"
//! - `HIKITSUGI_REQUEST_TIMEOUT`: Timeout for short requests in seconds - default: "30"
//! - `HIKITSUGI_ANALYSIS_TIMEOUT`: Timeout for upload, analysis and document
//!   generation in seconds - default: "1800"
//! - `HIKITSUGI_RETRY_INITIAL_MS`: First event stream reconnect delay - default: "1000"
//! - `HIKITSUGI_RETRY_MAX_MS`: Reconnect delay cap - default: "30000"
//! - `HIKITSUGI_MAX_RETRIES`: Reconnects before giving up - default: "5"
//! - `HIKITSUGI_MAX_UPLOAD_BYTES`: Largest accepted recording - default: 2 GiB
//! - `HIKITSUGI_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use hikitsugi::ClientConfig;
//!
//! let config = ClientConfig::default();
//! config.validate().expect("Invalid configuration");
//! println!("{}", config);
//! ```

use crate::controllers::DEFAULT_MAX_UPLOAD_BYTES;
use crate::events::RetryPolicy;
use serde::Serialize;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_RETRY_INITIAL_MS: u64 = 1000;
const DEFAULT_RETRY_MAX_MS: u64 = 30_000;
const DEFAULT_MAX_RETRIES: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid server URL: {0}. It must start with http:// or https://")]
    InvalidServerUrl(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientConfig {
    /// Base URL of the server, without the `/api` suffix
    pub server_url: String,

    pub request_timeout_secs: u64,

    /// Used for upload, analysis start and document generation
    pub analysis_timeout_secs: u64,

    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    pub max_retries: u32,

    pub max_upload_bytes: u64,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Default for ClientConfig {
    /// Loads `HIKITSUGI_*` environment variables, falling back to defaults
    /// for missing or unparsable values
    fn default() -> Self {
        let server_url = env::var("HIKITSUGI_SERVER_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());

        let log_level = env::var("HIKITSUGI_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            server_url,
            request_timeout_secs: env_parse(
                "HIKITSUGI_REQUEST_TIMEOUT",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
            analysis_timeout_secs: env_parse(
                "HIKITSUGI_ANALYSIS_TIMEOUT",
                DEFAULT_ANALYSIS_TIMEOUT_SECS,
            ),
            retry_initial_ms: env_parse("HIKITSUGI_RETRY_INITIAL_MS", DEFAULT_RETRY_INITIAL_MS),
            retry_max_ms: env_parse("HIKITSUGI_RETRY_MAX_MS", DEFAULT_RETRY_MAX_MS),
            max_retries: env_parse("HIKITSUGI_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            max_upload_bytes: env_parse("HIKITSUGI_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            log_level,
        }
    }
}

impl ClientConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any value is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(ConfigError::InvalidServerUrl(self.server_url.clone()));
        }

        if self.request_timeout_secs == 0 || self.analysis_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Timeouts must be at least 1 second".to_string(),
            ));
        }
        if self.analysis_timeout_secs < self.request_timeout_secs {
            return Err(ConfigError::ValidationFailed(
                "Analysis timeout cannot be shorter than the request timeout".to_string(),
            ));
        }

        if self.retry_initial_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "Initial retry delay must be at least 1ms".to_string(),
            ));
        }
        if self.retry_max_ms < self.retry_initial_ms {
            return Err(ConfigError::ValidationFailed(format!(
                "Retry delay cap ({}ms) is below the initial delay ({}ms)",
                self.retry_max_ms, self.retry_initial_ms
            )));
        }

        if self.max_upload_bytes == 0 {
            return Err(ConfigError::ValidationFailed(
                "Upload limit must be at least 1 byte".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry_initial_ms),
            Duration::from_millis(self.retry_max_ms),
            self.max_retries,
        )
    }
}

impl fmt::Display for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hikitsugi Configuration:")?;
        writeln!(f, "  Server URL: {}", self.server_url)?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(f, "  Analysis Timeout: {}s", self.analysis_timeout_secs)?;
        writeln!(
            f,
            "  Reconnect: {} retries, {}ms initial, {}ms cap",
            self.max_retries, self.retry_initial_ms, self.retry_max_ms
        )?;
        writeln!(f, "  Max Upload Size: {} bytes", self.max_upload_bytes)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
