//! The Always Memory record submitted to the council.

use crate::classifier::Classification;
use crate::error::CourierResult;
use crate::fingerprint::fingerprint;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// An immutable, classified memory record.
///
/// Built once through [`RecordBuilder`]; nothing downstream can change its
/// classification, trigger or payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    timestamp: DateTime<Utc>,
    classification: Classification,
    context_fingerprint: Option<String>,
    payload: Value,
}

impl Record {
    /// Start building a record with the given classification.
    pub fn builder(classification: Classification) -> RecordBuilder {
        RecordBuilder {
            timestamp: None,
            classification,
            context_fingerprint: None,
            payload: Value::Object(Default::default()),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn trigger(&self) -> Option<&str> {
        self.classification.trigger()
    }

    pub fn context_fingerprint(&self) -> Option<&str> {
        self.context_fingerprint.as_deref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// True iff the record is Sacred Zero.
    pub fn requires_human_review(&self) -> bool {
        self.classification.is_sacred_zero()
    }
}

/// Builder for [`Record`].
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    timestamp: Option<DateTime<Utc>>,
    classification: Classification,
    context_fingerprint: Option<String>,
    payload: Value,
}

impl RecordBuilder {
    /// Free-form description of the action (hashes, scores, ids).
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Fingerprint `context` and attach the result.
    pub fn context<T: Serialize + ?Sized>(mut self, context: &T) -> CourierResult<Self> {
        self.context_fingerprint = Some(fingerprint(context)?);
        Ok(self)
    }

    /// Attach a fingerprint computed elsewhere.
    pub fn context_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.context_fingerprint = Some(fingerprint.into());
        self
    }

    /// Override the creation time (defaults to now at `build`).
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn has_context(&self) -> bool {
        self.context_fingerprint.is_some()
    }

    pub fn build(self) -> Record {
        Record {
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            classification: self.classification,
            context_fingerprint: self.context_fingerprint,
            payload: self.payload,
        }
    }
}

/// JSON shape of a record on the wire.
#[derive(Serialize)]
struct WireRecord<'a> {
    timestamp: &'a DateTime<Utc>,
    classification: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    trigger: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_fingerprint: Option<&'a str>,
    requires_human_review: bool,
    payload: &'a Value,
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireRecord {
            timestamp: &self.timestamp,
            classification: self.classification.code(),
            trigger: self.trigger(),
            context_fingerprint: self.context_fingerprint(),
            requires_human_review: self.requires_human_review(),
            payload: &self.payload,
        }
        .serialize(serializer)
    }
}
