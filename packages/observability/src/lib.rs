//! # Observability
//!
//! Logging setup for the memory courier.
//!
//! Binaries call [`init`] or [`init_with_config`] once at startup and use
//! plain `tracing` macros everywhere else. Library code never installs a
//! subscriber.
//!
//! ## Outputs
//!
//! - stderr: compact human-readable lines (on by default)
//! - JSONL file: one structured entry per event, tagged with service name
//!   and pid, appended to `log_path` when one is configured
//!
//! Delivery failures are logged at `ERROR` with the record's classification
//! and trigger, so `jq 'select(.level == "ERROR")'` over the JSONL file lists
//! every record that never reached the council.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() -> std::io::Result<()> {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "memory-courier".into(),
//!         default_level: "debug".into(),
//!         log_path: observability::jsonl_path(None, true),
//!         ..Default::default()
//!     })?;
//!
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

mod file_writer;
mod json_layer;

pub use file_writer::AppendWriter;
pub use json_layer::{JsonLayer, LogEntry};

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name written into every JSONL entry.
    pub service_name: String,

    /// Default filter (e.g. "info", "memory_courier=debug").
    /// `RUST_LOG` takes precedence when set.
    pub default_level: String,

    /// Append JSONL entries to this file.
    pub log_path: Option<PathBuf>,

    /// Emit compact lines on stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Conventional JSONL location: `~/.tml/logs/courier.jsonl`.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tml").join("logs").join("courier.jsonl"))
}

/// Where JSONL entries go: an explicit path wins, otherwise the default
/// location when `use_default` is set, otherwise nowhere.
pub fn jsonl_path(explicit: Option<PathBuf>, use_default: bool) -> Option<PathBuf> {
    explicit.or_else(|| use_default.then(default_log_path).flatten())
}

/// Initialize logging with default settings (stderr only, `info`).
pub fn init(service_name: &str) -> io::Result<()> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize logging with custom configuration.
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let json_layer = match &config.log_path {
        Some(path) => {
            let writer = AppendWriter::open(path)?;
            Some(
                JsonLayer::new(config.service_name.clone(), writer)
                    .with_filter(env_filter(&config.default_level)),
            )
        }
        None => None,
    };

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;

    if let Some(path) = &config.log_path {
        tracing::debug!(log_path = %path.display(), "JSONL logging enabled");
    }
    Ok(())
}

/// `RUST_LOG` if set and valid, otherwise `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(config.also_stderr);
    }

    #[test]
    fn test_default_log_path_location() {
        if let Some(path) = default_log_path() {
            assert!(path.ends_with(".tml/logs/courier.jsonl"));
        }
    }

    #[test]
    fn test_jsonl_path_resolution() {
        let explicit = PathBuf::from("/tmp/courier-test.jsonl");
        assert_eq!(
            jsonl_path(Some(explicit.clone()), true),
            Some(explicit.clone())
        );
        assert_eq!(jsonl_path(Some(explicit.clone()), false), Some(explicit));
        assert_eq!(jsonl_path(None, false), None);
        assert_eq!(jsonl_path(None, true), default_log_path());
    }

    #[test]
    fn test_concurrent_events_produce_whole_lines() {
        use std::thread;
        use tracing_subscriber::layer::SubscriberExt;

        const THREADS: usize = 8;
        const EVENTS: usize = 2000;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.jsonl");
        let writer = AppendWriter::open(&path).unwrap();
        let dispatch = tracing::Dispatch::new(
            tracing_subscriber::registry().with(JsonLayer::new("memory-courier".into(), writer)),
        );

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let dispatch = dispatch.clone();
                thread::spawn(move || {
                    tracing::dispatcher::with_default(&dispatch, || {
                        for n in 0..EVENTS {
                            tracing::info!(
                                thread = t as u64,
                                n = n as u64,
                                trigger = "planetary_harm",
                                "memory submission failed after retries"
                            );
                        }
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), THREADS * EVENTS);
        for line in lines {
            let entry: serde_json::Value = serde_json::from_str(line)
                .unwrap_or_else(|e| panic!("corrupted line {:?}: {}", line, e));
            assert_eq!(entry["fields"]["trigger"], "planetary_harm");
        }
    }

    #[test]
    fn test_init_fails_on_unwritable_log_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let result = init_with_config(LogConfig {
            service_name: "test".into(),
            log_path: Some(dir.path().to_path_buf()),
            also_stderr: false,
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
