//! High-level entry points: classify, fingerprint and submit in one call.

use crate::classifier::{ClassificationSignals, Classifier};
use crate::config::CourierConfig;
use crate::error::{CourierError, CourierResult};
use crate::record::Record;
use crate::submitter::{SubmissionOutcome, Submitter};
use crate::transport::{DeliveryTransport, HttpTransport};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Raw description of an action, before classification.
#[derive(Debug, Clone, Default)]
pub struct MemoryDraft {
    /// Action name, stored in the payload under `action`.
    pub action: Option<String>,
    pub signals: ClassificationSignals,
    pub payload: Map<String, Value>,
    /// Context to fingerprint, if any.
    pub context: Option<Value>,
}

/// Classifies and delivers memory records to the configured council.
#[derive(Clone)]
pub struct MemoryCourier {
    classifier: Classifier,
    submitter: Submitter,
    destination: String,
    require_fingerprint_for_sacred_zero: bool,
}

impl MemoryCourier {
    /// Build a courier that talks HTTP.
    pub fn from_config(config: &CourierConfig) -> CourierResult<Self> {
        let transport = HttpTransport::new(config.request_timeout())?;
        Self::new(config, Arc::new(transport))
    }

    /// Build a courier over any transport.
    pub fn new(config: &CourierConfig, transport: Arc<dyn DeliveryTransport>) -> CourierResult<Self> {
        config.validate()?;
        Ok(Self {
            classifier: config.classifier()?,
            submitter: Submitter::new(transport, config.retry_policy())?,
            destination: config.destination_url.clone(),
            require_fingerprint_for_sacred_zero: config.require_fingerprint_for_sacred_zero,
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Turn a draft into an immutable record. No network activity.
    pub fn build_record(&self, draft: MemoryDraft) -> CourierResult<Record> {
        let classification = self.classifier.classify(&draft.signals)?;

        let mut payload = draft.payload;
        if let Some(action) = draft.action {
            payload.insert("action".to_string(), Value::String(action));
        }

        let mut builder = Record::builder(classification.clone()).payload(Value::Object(payload));
        if let Some(context) = &draft.context {
            builder = builder.context(context)?;
        }

        if self.require_fingerprint_for_sacred_zero
            && classification.is_sacred_zero()
            && !builder.has_context()
        {
            return Err(CourierError::InvalidInput(
                "Sacred Zero records must carry a context fingerprint".to_string(),
            ));
        }

        let record = builder.build();
        debug!(
            memory_type = record.classification().routing_tag(),
            trigger = record.trigger().unwrap_or(""),
            fingerprint = record.context_fingerprint().unwrap_or(""),
            "Memory record built"
        );
        Ok(record)
    }

    /// Classify and deliver a draft.
    pub async fn submit_memory(
        &self,
        draft: MemoryDraft,
        cancel: &CancellationToken,
    ) -> SubmissionOutcome {
        let record = self.build_record(draft)?;
        self.submit_record(&record, cancel).await
    }

    /// Deliver an already built record to the configured destination.
    pub async fn submit_record(&self, record: &Record, cancel: &CancellationToken) -> SubmissionOutcome {
        self.submitter
            .submit_with_cancel(record, &self.destination, cancel)
            .await
    }

    /// Escalate an event for human review. The context is always fingerprinted.
    pub async fn submit_sacred_zero(
        &self,
        trigger: &str,
        context: Value,
        cancel: &CancellationToken,
    ) -> SubmissionOutcome {
        let draft = MemoryDraft {
            signals: ClassificationSignals::with_trigger(trigger),
            context: Some(context),
            ..Default::default()
        };
        self.submit_memory(draft, cancel).await
    }

    /// Record an environmental impact assessment.
    ///
    /// The impact's `irreversibility_score` is the severity signal; the
    /// whole assessment travels in the payload as `environmental_impact`.
    pub async fn submit_planetary_impact(
        &self,
        impact: Value,
        cancel: &CancellationToken,
    ) -> SubmissionOutcome {
        let draft = planetary_impact_draft(impact)?;
        self.submit_memory(draft, cancel).await
    }
}

fn planetary_impact_draft(impact: Value) -> CourierResult<MemoryDraft> {
    let score = impact
        .get("irreversibility_score")
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            CourierError::InvalidInput("impact needs a numeric irreversibility_score".to_string())
        })?;

    let mut payload = Map::new();
    payload.insert("environmental_impact".to_string(), impact);

    Ok(MemoryDraft {
        signals: ClassificationSignals::with_severity(score),
        payload,
        ..Default::default()
    })
}
