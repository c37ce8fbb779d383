//! Error types for the memory courier.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single delivery attempt.
///
/// These are absorbed by the submitter's retry loop. Callers only ever see
/// the last one, wrapped in [`CourierError::Exhausted`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The council answered 429 and asked us to slow down.
    #[error("Backpressure: retry after {}s", retry_after.as_secs())]
    Backpressure {
        /// Wait requested by the server (or the default when it gave none).
        retry_after: Duration,
    },

    /// The council answered with a non-2xx, non-429 status.
    #[error("Council rejected: {status} - {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for debugging.
        body: String,
    },

    /// Network-level failure (connect, timeout, TLS, body read).
    #[error("Transport error: {0}")]
    Transport(String),

    /// A 2xx response whose body carried no usable confirmation id.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Courier error type.
#[derive(Error, Debug)]
pub enum CourierError {
    /// Caller supplied a record without a usable classification signal,
    /// or with an out-of-range severity.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A context or record could not be canonically serialized.
    #[error("Unserializable input: {0}")]
    Unserializable(String),

    /// The destination is not an absolute http(s) URL.
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// Every permitted attempt failed.
    #[error("Submission exhausted after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Total attempts made.
        attempts: u32,
        /// Error observed on the final attempt.
        last_error: DeliveryError,
    },

    /// The submission was abandoned by its caller.
    #[error("Submission cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts completed before cancellation took effect.
        attempts: u32,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (config file reads)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CourierError {
    /// Number of network attempts made before this error was produced.
    ///
    /// Zero for errors raised before the first request.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts } => *attempts,
            _ => 0,
        }
    }

    /// Whether the error came from caller input rather than the network.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::Unserializable(_) | Self::InvalidDestination(_)
        )
    }
}

/// Result type alias using CourierError.
pub type CourierResult<T> = Result<T, CourierError>;
