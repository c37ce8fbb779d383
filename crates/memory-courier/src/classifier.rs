//! Priority classification of memory records.

use crate::error::{CourierError, CourierResult};

/// Severity above which an untriggered record escalates to Sacred Zero.
pub const DEFAULT_SEVERITY_THRESHOLD: f64 = 0.7;

/// Trigger label assigned when escalation comes from the severity score.
pub const SEVERITY_TRIGGER: &str = "planetary_harm";

/// Priority of a record.
///
/// The trigger lives inside the Sacred Zero variant, so a standard record
/// can never carry one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Highest priority: the action needs human review.
    SacredZero {
        /// Why the record was escalated.
        trigger: String,
    },
    /// Routine record.
    Standard,
}

impl Classification {
    /// Ternary-logic code used on the wire (0 = Sacred Zero, 1 = proceed).
    pub fn code(&self) -> u8 {
        match self {
            Self::SacredZero { .. } => 0,
            Self::Standard => 1,
        }
    }

    /// Value of the priority-routing header.
    pub fn routing_tag(&self) -> &'static str {
        match self {
            Self::SacredZero { .. } => "sacred-zero",
            Self::Standard => "standard",
        }
    }

    pub fn trigger(&self) -> Option<&str> {
        match self {
            Self::SacredZero { trigger } => Some(trigger),
            Self::Standard => None,
        }
    }

    pub fn is_sacred_zero(&self) -> bool {
        matches!(self, Self::SacredZero { .. })
    }
}

/// The discriminating inputs of a classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationSignals {
    /// Explicit trigger name; forces Sacred Zero when non-blank.
    pub trigger: Option<String>,
    /// Irreversibility / severity score in [0.0, 1.0].
    pub severity_score: Option<f64>,
}

impl ClassificationSignals {
    pub fn with_trigger(trigger: impl Into<String>) -> Self {
        Self {
            trigger: Some(trigger.into()),
            severity_score: None,
        }
    }

    pub fn with_severity(score: f64) -> Self {
        Self {
            trigger: None,
            severity_score: Some(score),
        }
    }
}

/// Maps signals to a [`Classification`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classifier {
    severity_threshold: f64,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            severity_threshold: DEFAULT_SEVERITY_THRESHOLD,
        }
    }
}

impl Classifier {
    /// Create a classifier with a custom threshold in [0.0, 1.0].
    pub fn new(severity_threshold: f64) -> CourierResult<Self> {
        if !unit_interval(severity_threshold) {
            return Err(CourierError::Config(format!(
                "severity threshold must be within [0, 1], got {}",
                severity_threshold
            )));
        }
        Ok(Self { severity_threshold })
    }

    pub fn severity_threshold(&self) -> f64 {
        self.severity_threshold
    }

    /// Classify a record.
    ///
    /// An explicit trigger wins. Otherwise a score strictly above the
    /// threshold escalates with [`SEVERITY_TRIGGER`]. Having neither signal
    /// is a caller error.
    pub fn classify(&self, signals: &ClassificationSignals) -> CourierResult<Classification> {
        let trigger = signals
            .trigger
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        if let Some(trigger) = trigger {
            return Ok(Classification::SacredZero {
                trigger: trigger.to_string(),
            });
        }

        let Some(score) = signals.severity_score else {
            return Err(CourierError::InvalidInput(
                "record needs a trigger or a severity score".to_string(),
            ));
        };

        if !unit_interval(score) {
            return Err(CourierError::InvalidInput(format!(
                "severity score must be within [0, 1], got {}",
                score
            )));
        }

        if score > self.severity_threshold {
            Ok(Classification::SacredZero {
                trigger: SEVERITY_TRIGGER.to_string(),
            })
        } else {
            Ok(Classification::Standard)
        }
    }
}

fn unit_interval(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}
