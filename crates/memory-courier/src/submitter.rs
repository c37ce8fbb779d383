//! Submission with retry, backoff and backpressure cooperation.
//!
//! One call to [`Submitter::submit`] is one self-contained state machine:
//!
//! ```text
//! READY ──▶ SENDING ──2xx──────────────▶ SUCCESS
//!              │  ▲
//!        429 / │  │ sleep (Retry-After, or base * 2^(n-1))
//!      failure ▼  │
//!            BACKOFF ──attempt == max──▶ FAILED
//! ```
//!
//! A 429 waits exactly as long as the council asks; every other failure
//! (non-2xx status, network error, unusable body) follows the exponential
//! schedule. Both share one attempt counter and one `max_attempts` ceiling.
//! The only state is that counter, owned by the call.

use crate::error::{CourierError, CourierResult, DeliveryError};
use crate::record::Record;
use crate::transport::{DeliveryTransport, TransportRequest, TransportResponse};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Protocol version sent in [`VERSION_HEADER`].
pub const PROTOCOL_VERSION: &str = "v5.0";
/// Framework tag added to every request body.
pub const FRAMEWORK_TAG: &str = "TML-AlwaysMemory-v5.0";

pub const VERSION_HEADER: &str = "X-TML-Version";
pub const MEMORY_TYPE_HEADER: &str = "X-Memory-Type";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(300);
/// Wait applied to a 429 without a usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Response fields accepted as the confirmation id, in priority order.
const CONFIRMATION_FIELDS: [&str; 4] = ["memory_id", "confirmation_id", "ack_id", "id"];

/// Longest response body kept in a [`DeliveryError::Status`].
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Terminal result of a submission.
pub type SubmissionOutcome = CourierResult<Confirmation>;

/// Proof that the council accepted a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confirmation {
    /// Identifier returned by the council.
    pub confirmation_id: String,
    /// Attempts it took, including the successful one.
    pub attempts: u32,
    /// Full acknowledgement body.
    pub receipt: Value,
}

/// Retry limits and timings.
///
/// # Backoff Calculation
///
/// After the n-th failed attempt the exponential arm waits
/// `backoff_base * 2^(n-1)`, capped at `backoff_max`. With the defaults:
/// - 1st failure: 1s
/// - 2nd failure: 2s
/// - 3rd failure: 4s
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub backoff_base: Duration,
    /// Cap on the exponential delay.
    pub backoff_max: Duration,
    /// Wait used when a 429 carries no numeric `Retry-After`.
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
            default_retry_after: DEFAULT_RETRY_AFTER,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Exponential delay after the given (1-based) failed attempt.
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.backoff_base.as_millis() as u64;
        let max_ms = self.backoff_max.as_millis() as u64;
        let multiplier = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(multiplier).min(max_ms);

        Duration::from_millis(delay_ms)
    }

    /// Decide what follows the given attempt.
    ///
    /// This is the whole transition table; it never touches the network.
    pub fn resolve(&self, attempt: u32, decision: RetryDecision) -> AttemptOutcome {
        let (error, delay) = match decision {
            RetryDecision::Confirmed {
                confirmation_id,
                receipt,
            } => {
                return AttemptOutcome::Success {
                    confirmation_id,
                    receipt,
                }
            }
            RetryDecision::ServerDirected { wait } => {
                (DeliveryError::Backpressure { retry_after: wait }, wait)
            }
            RetryDecision::Exponential(error) => (error, self.exponential_delay(attempt)),
        };

        if attempt >= self.max_attempts {
            AttemptOutcome::TerminalFailure(error)
        } else {
            AttemptOutcome::RetryableFailure { error, delay }
        }
    }
}

/// How a single response should be treated.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// 2xx with a confirmation id.
    Confirmed {
        confirmation_id: String,
        receipt: Value,
    },
    /// 429: wait what the server asked for.
    ServerDirected { wait: Duration },
    /// Anything else: follow the exponential schedule.
    Exponential(DeliveryError),
}

/// Result of one attempt once the policy has been applied.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success {
        confirmation_id: String,
        receipt: Value,
    },
    RetryableFailure {
        error: DeliveryError,
        delay: Duration,
    },
    TerminalFailure(DeliveryError),
}

/// One network round trip and what came of it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryAttempt {
    /// 1-based attempt number.
    pub number: u32,
    pub outcome: AttemptOutcome,
}

/// Classify a transport result into a [`RetryDecision`].
pub fn interpret_response(
    result: Result<TransportResponse, DeliveryError>,
    default_retry_after: Duration,
) -> RetryDecision {
    let response = match result {
        Ok(response) => response,
        Err(e) => return RetryDecision::Exponential(e),
    };

    if response.status == 429 {
        return RetryDecision::ServerDirected {
            wait: parse_retry_after(response.header("retry-after"), default_retry_after),
        };
    }

    if !response.is_success() {
        return RetryDecision::Exponential(DeliveryError::Status {
            status: response.status,
            body: body_snippet(&response.body),
        });
    }

    match parse_confirmation(&response.body) {
        Ok((confirmation_id, receipt)) => RetryDecision::Confirmed {
            confirmation_id,
            receipt,
        },
        Err(e) => RetryDecision::Exponential(e),
    }
}

/// Parse a `Retry-After` value as integer seconds.
///
/// Missing, negative, fractional or HTTP-date values fall back to `default`.
pub fn parse_retry_after(value: Option<&str>, default: Duration) -> Duration {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn parse_confirmation(body: &[u8]) -> Result<(String, Value), DeliveryError> {
    let receipt: Value = serde_json::from_slice(body)
        .map_err(|e| DeliveryError::InvalidResponse(format!("body is not JSON: {}", e)))?;

    let confirmation_id = CONFIRMATION_FIELDS
        .iter()
        .find_map(|field| receipt.get(*field).and_then(as_identifier))
        .ok_or_else(|| {
            DeliveryError::InvalidResponse("no confirmation id in response".to_string())
        })?;

    Ok((confirmation_id, receipt))
}

fn as_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn body_snippet(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .chars()
        .take(MAX_ERROR_BODY_CHARS)
        .collect()
}

/// Record plus transport framing. The record itself is not touched.
#[derive(Serialize)]
struct FramedRecord<'a> {
    #[serde(flatten)]
    record: &'a Record,
    framework: &'static str,
}

/// Serialize a record into the request body.
pub fn frame_record(record: &Record) -> CourierResult<Vec<u8>> {
    serde_json::to_vec(&FramedRecord {
        record,
        framework: FRAMEWORK_TAG,
    })
    .map_err(|e| CourierError::Unserializable(e.to_string()))
}

/// Parse and check a destination URL.
pub fn parse_destination(destination: &str) -> CourierResult<Url> {
    let url = Url::parse(destination.trim())
        .map_err(|e| CourierError::InvalidDestination(format!("{}: {}", destination, e)))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(CourierError::InvalidDestination(format!(
            "{}: expected an http(s) URL",
            destination
        )));
    }

    Ok(url)
}

/// Delivers records to a council endpoint.
///
/// Holds only a retry policy and a shared transport handle, so one
/// submitter can serve any number of concurrent submissions.
#[derive(Clone)]
pub struct Submitter {
    transport: Arc<dyn DeliveryTransport>,
    policy: RetryPolicy,
}

impl Submitter {
    /// Create a submitter. `max_attempts` must be at least 1.
    pub fn new(transport: Arc<dyn DeliveryTransport>, policy: RetryPolicy) -> CourierResult<Self> {
        if policy.max_attempts == 0 {
            return Err(CourierError::Config(
                "max attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self { transport, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver a record, retrying until success or exhaustion.
    pub async fn submit(&self, record: &Record, destination: &str) -> SubmissionOutcome {
        self.submit_with_cancel(record, destination, &CancellationToken::new())
            .await
    }

    /// Deliver a record, giving up early once `cancel` fires.
    ///
    /// Cancellation is observed before every request and during every
    /// backoff sleep; it never interrupts a request already on the wire.
    pub async fn submit_with_cancel(
        &self,
        record: &Record,
        destination: &str,
        cancel: &CancellationToken,
    ) -> SubmissionOutcome {
        let url = parse_destination(destination)?;
        let body = frame_record(record)?;
        let headers = vec![
            ("Content-Type", "application/json".to_string()),
            (VERSION_HEADER, PROTOCOL_VERSION.to_string()),
            (
                MEMORY_TYPE_HEADER,
                record.classification().routing_tag().to_string(),
            ),
        ];

        let mut number = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(record, number));
            }

            number += 1;
            debug!(
                url = %url,
                attempt = number,
                memory_type = record.classification().routing_tag(),
                "Submitting memory"
            );

            let result = self
                .transport
                .post(TransportRequest {
                    url: url.clone(),
                    headers: headers.clone(),
                    body: body.clone(),
                })
                .await;

            let decision = interpret_response(result, self.policy.default_retry_after);
            let attempt = DeliveryAttempt {
                number,
                outcome: self.policy.resolve(number, decision),
            };

            match attempt.outcome {
                AttemptOutcome::Success {
                    confirmation_id,
                    receipt,
                } => {
                    info!(
                        confirmation_id = %confirmation_id,
                        attempts = attempt.number,
                        memory_type = record.classification().routing_tag(),
                        "Memory submitted"
                    );
                    return Ok(Confirmation {
                        confirmation_id,
                        attempts: attempt.number,
                        receipt,
                    });
                }
                AttemptOutcome::RetryableFailure { error, delay } => {
                    warn!(
                        attempt = attempt.number,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Memory submission failed, retrying"
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(self.cancelled(record, attempt.number));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                AttemptOutcome::TerminalFailure(last_error) => {
                    error!(
                        attempts = attempt.number,
                        memory_type = record.classification().routing_tag(),
                        trigger = record.trigger().unwrap_or(""),
                        requires_human_review = record.requires_human_review(),
                        error = %last_error,
                        "CRITICAL: memory submission failed after retries"
                    );
                    return Err(CourierError::Exhausted {
                        attempts: attempt.number,
                        last_error,
                    });
                }
            }
        }
    }

    fn cancelled(&self, record: &Record, attempts: u32) -> CourierError {
        warn!(
            attempts,
            requires_human_review = record.requires_human_review(),
            "Memory submission cancelled"
        );
        CourierError::Cancelled { attempts }
    }
}
