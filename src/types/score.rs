//! Scoring output data structures

use crate::escalation::FlagReasons;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Probability above which a score is reported as high confidence
pub const HIGH_CONFIDENCE_ABOVE: f64 = 0.80;

/// Probability above which a score is reported as medium confidence
pub const MEDIUM_CONFIDENCE_ABOVE: f64 = 0.50;

/// Coarse confidence tier for human-facing display.
///
/// Bucketed from the probability alone; the operating threshold plays no part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Bucket a fraud probability. Both cut points are exclusive.
    pub fn from_probability(probability: f64) -> Self {
        if probability > HIGH_CONFIDENCE_ABOVE {
            Confidence::High
        } else if probability > MEDIUM_CONFIDENCE_ABOVE {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

/// Result of scoring one transaction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Calibrated fraud probability (0.0 - 1.0)
    pub fraud_probability: f64,

    /// `fraud_probability >= threshold`
    pub is_fraud: bool,

    /// Threshold-independent confidence tier
    pub confidence: Confidence,
}

impl ScoreResult {
    /// Build a result from a probability and the active threshold.
    ///
    /// The boundary is inclusive: a probability equal to the threshold is flagged.
    pub fn from_probability(fraud_probability: f64, threshold: f64) -> Self {
        Self {
            fraud_probability,
            is_fraud: fraud_probability >= threshold,
            confidence: Confidence::from_probability(fraud_probability),
        }
    }
}

/// Decision published on the message bus for a scored event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreDecision {
    /// Unique decision identifier
    pub decision_id: String,

    /// Associated transaction ID
    pub transaction_id: String,

    #[serde(flatten)]
    pub result: ScoreResult,

    /// Threshold the decision was taken against
    pub threshold: f64,

    /// Flagged by an escalation rule rather than by the model
    #[serde(default)]
    pub escalated: bool,

    /// Present whenever the decision is flagged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<FlagReasons>,

    /// Decision timestamp
    pub scored_at: DateTime<Utc>,
}

impl ScoreDecision {
    pub fn new(transaction_id: String, result: ScoreResult, threshold: f64) -> Self {
        Self {
            decision_id: uuid::Uuid::new_v4().to_string(),
            transaction_id,
            result,
            threshold,
            escalated: false,
            reasons: None,
            scored_at: Utc::now(),
        }
    }

    /// Attach escalation outcome and reasons.
    pub fn with_reasons(mut self, escalated: bool, reasons: FlagReasons) -> Self {
        self.escalated = escalated;
        self.reasons = Some(reasons);
        self
    }

    /// Flagged by the model or by escalation
    pub fn is_flagged(&self) -> bool {
        self.result.is_fraud || self.escalated
    }
}

/// Health snapshot of a running scoring service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "healthy" or "degraded"
    pub status: String,
    pub model_loaded: bool,
    pub threshold: f64,
}
