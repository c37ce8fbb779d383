//! Configuration for the memory courier.

use crate::classifier::{Classifier, DEFAULT_SEVERITY_THRESHOLD};
use crate::error::{CourierError, CourierResult};
use crate::submitter::{parse_destination, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Council endpoint used when nothing else is configured.
pub const DEFAULT_DESTINATION_URL: &str = "https://stewardship-council.example.com/v1/memories";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Courier configuration.
///
/// Every key is optional in the config file; missing keys take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourierConfig {
    /// Council endpoint records are POSTed to.
    pub destination_url: String,
    /// Total delivery attempts per record (at least 1).
    pub max_attempts: u32,
    /// Severity above which a record escalates to Sacred Zero.
    pub severity_threshold: f64,
    /// First exponential backoff delay in milliseconds.
    pub backoff_base_ms: u64,
    /// Cap on the exponential backoff delay in milliseconds.
    pub backoff_max_ms: u64,
    /// Wait applied to a 429 without a numeric `Retry-After`.
    pub default_retry_after_secs: u64,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Refuse to build Sacred Zero records that carry no context fingerprint.
    pub require_fingerprint_for_sacred_zero: bool,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            destination_url: DEFAULT_DESTINATION_URL.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            severity_threshold: DEFAULT_SEVERITY_THRESHOLD,
            backoff_base_ms: 1_000,
            backoff_max_ms: 300_000,
            default_retry_after_secs: 5,
            request_timeout_secs: 30,
            require_fingerprint_for_sacred_zero: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl CourierConfig {
    /// Default config file location: `~/.tml/courier.json`.
    pub fn default_path() -> CourierResult<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".tml").join("courier.json"))
            .ok_or_else(|| CourierError::Config("home directory not found".to_string()))
    }

    /// Load configuration: defaults, then the config file (if present),
    /// then environment overrides. The result is validated.
    pub fn load(path: Option<&Path>) -> CourierResult<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().ok(),
        };

        let mut config = match path {
            Some(ref p) if p.exists() => Self::load_from_file(p)?,
            _ => Self::default(),
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CourierResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CourierConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override configuration from environment variables.
    ///
    /// Unparseable numeric values are ignored.
    fn load_from_env(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("STEWARDSHIP_COUNCIL_URL").and_then(non_empty) {
            self.destination_url = url;
        }
        if let Some(n) = var("MEMORY_COURIER_MAX_ATTEMPTS").and_then(|s| s.trim().parse().ok()) {
            self.max_attempts = n;
        }
        if let Some(t) =
            var("MEMORY_COURIER_SEVERITY_THRESHOLD").and_then(|s| s.trim().parse().ok())
        {
            self.severity_threshold = t;
        }
        if let Some(ms) = var("MEMORY_COURIER_BACKOFF_BASE_MS").and_then(|s| s.trim().parse().ok())
        {
            self.backoff_base_ms = ms;
        }
        if let Some(secs) = var("MEMORY_COURIER_TIMEOUT_SECS").and_then(|s| s.trim().parse().ok()) {
            self.request_timeout_secs = secs;
        }
        if let Some(level) = var("MEMORY_COURIER_LOG_LEVEL").and_then(non_empty) {
            self.log_level = level;
        }
    }

    /// Check ranges and the destination URL.
    pub fn validate(&self) -> CourierResult<()> {
        if self.max_attempts == 0 {
            return Err(CourierError::Config(
                "maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(CourierError::Config(
                "requestTimeoutSecs must be at least 1".to_string(),
            ));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(CourierError::Config(
                "backoffMaxMs must not be below backoffBaseMs".to_string(),
            ));
        }
        Classifier::new(self.severity_threshold)?;
        parse_destination(&self.destination_url)
            .map_err(|e| CourierError::Config(format!("destinationUrl: {}", e)))?;
        Ok(())
    }

    pub fn classifier(&self) -> CourierResult<Classifier> {
        Classifier::new(self.severity_threshold)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            default_retry_after: Duration::from_secs(self.default_retry_after_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
