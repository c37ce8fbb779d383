//! Memory Courier: retrying delivery of Always Memory records.
//!
//! The courier takes one locally produced record, classifies it, optionally
//! fingerprints its context, and delivers it to a Stewardship Council
//! endpoint over an unreliable network.
//!
//! # Core Invariants
//!
//! 1. **Immutable Records**: classification and trigger are fixed when the
//!    record is built; the submitter only adds transport framing
//! 2. **Bounded Retry**: at most `max_attempts` requests per submission
//! 3. **Server-Directed Backpressure**: a 429 waits exactly `Retry-After`
//! 4. **Loud Failure**: exhaustion is returned to the caller and logged as
//!    a critical event, never swallowed
//! 5. **No Shared State**: concurrent submissions share nothing mutable
//!
//! # Architecture
//!
//! ```text
//! MemoryDraft -> Classifier -> Record (+ fingerprint) -> Submitter -> Council
//!                                                           ^    |
//!                                                           |____| 429 / failure
//! ```

pub mod classifier;
pub mod config;
pub mod courier;
pub mod error;
pub mod fingerprint;
pub mod record;
pub mod submitter;
pub mod transport;

#[cfg(test)]
mod tests;

pub use classifier::{
    Classification, ClassificationSignals, Classifier, DEFAULT_SEVERITY_THRESHOLD,
    SEVERITY_TRIGGER,
};
pub use config::CourierConfig;
pub use courier::{MemoryCourier, MemoryDraft};
pub use error::{CourierError, CourierResult, DeliveryError};
pub use fingerprint::{fingerprint, FINGERPRINT_LEN};
pub use record::{Record, RecordBuilder};
pub use submitter::{
    AttemptOutcome, Confirmation, DeliveryAttempt, RetryDecision, RetryPolicy,
    SubmissionOutcome, Submitter,
};
pub use tokio_util::sync::CancellationToken;
pub use transport::{DeliveryTransport, HttpTransport, TransportRequest, TransportResponse};
