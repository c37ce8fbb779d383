//! Integration tests for the memory courier.
//!
//! - `harness.rs`        - Scripted transport and a minimal HTTP responder
//! - `delivery.rs`       - Success path and confirmation parsing
//! - `backpressure.rs`   - 429 handling and `Retry-After`
//! - `exhaustion.rs`     - Exponential backoff and terminal failure
//! - `cancellation.rs`   - Cancellation before requests and during sleeps
//! - `framing.rs`        - Headers, body framing, record immutability
//! - `courier.rs`        - Classify + fingerprint + submit entry points
//! - `http_transport.rs` - reqwest transport against a real socket
//!
//! Timing tests run on paused tokio time, so backoff sleeps are asserted
//! on the virtual clock without slowing the suite.

mod framing;
pub(crate) mod harness;
