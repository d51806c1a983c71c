//! Online scoring of single transactions.
//!
//! A [`ScoringService`] is assembled once at startup from the model state and
//! the resolved threshold, then shared read-only by every request handler.

use crate::error::ScoringError;
use crate::escalation::{EscalationRule, FlagReasons};
use crate::models::loader::ModelState;
use crate::threshold::ThresholdConfig;
use crate::types::score::{HealthStatus, ScoreDecision, ScoreResult};
use crate::types::transaction::{ScoringEvent, TransactionRecord};
use tracing::{debug, error};

/// Immutable scoring context shared across requests
#[derive(Debug, Clone)]
pub struct ScoringService {
    model: ModelState,
    threshold: ThresholdConfig,
}

impl ScoringService {
    pub fn new(model: ModelState, threshold: ThresholdConfig) -> Self {
        Self { model, threshold }
    }

    pub fn threshold(&self) -> &ThresholdConfig {
        &self.threshold
    }

    /// Score one transaction against the active threshold.
    pub fn score(&self, record: &TransactionRecord) -> Result<ScoreResult, ScoringError> {
        let (model, extractor) = match &self.model {
            ModelState::Ready { model, extractor } => (model, extractor),
            ModelState::Unavailable { .. } => return Err(ScoringError::ModelUnavailable),
        };
        record.validate()?;

        let features = extractor.extract(record);
        if let Some(column) = features.iter().position(|v| !v.is_finite()) {
            error!(column, ?record, "Non-finite feature value");
            return Err(ScoringError::Evaluation(format!(
                "feature {column} is not finite"
            )));
        }

        let probability = model.predict_probability(&features);
        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            error!(probability, ?record, "Model returned an invalid probability");
            return Err(ScoringError::Evaluation(format!(
                "model returned probability {probability}"
            )));
        }

        let result = ScoreResult::from_probability(probability, self.threshold.value());
        debug!(
            fraud_probability = result.fraud_probability,
            is_fraud = result.is_fraud,
            confidence = result.confidence.as_str(),
            "Transaction scored"
        );
        Ok(result)
    }

    /// Score a bus event into a publishable decision.
    ///
    /// Escalation rules may flag an event the model clears; `result.is_fraud`
    /// still reflects the model and threshold alone.
    pub fn decide(&self, event: &ScoringEvent) -> Result<ScoreDecision, ScoringError> {
        let result = self.score(&event.record)?;
        let decision = ScoreDecision::new(
            event.transaction_id.clone(),
            result,
            self.threshold.value(),
        );

        let rules = EscalationRule::triggered(&event.record);
        if !result.is_fraud && rules.is_empty() {
            return Ok(decision);
        }
        let escalated = !result.is_fraud;
        if escalated {
            debug!(
                transaction_id = %event.transaction_id,
                fraud_probability = result.fraud_probability,
                ?rules,
                "Transaction escalated by rule"
            );
        }
        let reasons = FlagReasons::new(&event.record, result.fraud_probability, rules);
        Ok(decision.with_reasons(escalated, reasons))
    }

    /// Health snapshot; reflects startup state only.
    pub fn health(&self) -> HealthStatus {
        let model_loaded = self.model.is_loaded();
        HealthStatus {
            status: if model_loaded { "healthy" } else { "degraded" }.to_string(),
            model_loaded,
            threshold: self.threshold.value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::{FeatureExtractor, FeatureVector};
    use crate::models::ProbabilityModel;
    use crate::threshold::ThresholdSource;
    use crate::types::score::Confidence;
    use std::sync::Arc;

    struct FixedModel(f64);

    impl ProbabilityModel for FixedModel {
        fn predict_probability(&self, _features: &FeatureVector) -> f64 {
            self.0
        }
    }

    /// Probability equals the velocity feature divided by 10.
    struct VelocityModel;

    impl ProbabilityModel for VelocityModel {
        fn predict_probability(&self, features: &FeatureVector) -> f64 {
            (features[4] / 10.0).min(1.0)
        }
    }

    fn service(model: impl ProbabilityModel + 'static, threshold: f64) -> ScoringService {
        ScoringService::new(
            ModelState::ready(Arc::new(model), FeatureExtractor::default()),
            ThresholdConfig::new(threshold, ThresholdSource::Default).unwrap(),
        )
    }

    fn record() -> TransactionRecord {
        TransactionRecord::new(20.0, 14, 0, 0, 0)
    }

    #[test]
    fn test_probability_equal_to_threshold_is_fraud() {
        let result = service(FixedModel(0.9), 0.9).score(&record()).unwrap();

        assert!(result.is_fraud);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_below_threshold_keeps_medium_confidence() {
        let result = service(FixedModel(0.6), 0.98).score(&record()).unwrap();

        assert!(!result.is_fraud);
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn test_decision_is_monotone_in_probability() {
        let svc = service(VelocityModel, 0.45);
        let results: Vec<ScoreResult> = (0..=10)
            .map(|v| svc.score(&TransactionRecord::new(20.0, 14, 0, 0, v)).unwrap())
            .collect();

        for pair in results.windows(2) {
            assert!(pair[1].fraud_probability >= pair[0].fraud_probability);
            assert!(!(pair[0].is_fraud && !pair[1].is_fraud));
        }
        assert!(!results[4].is_fraud);
        assert!(results[5].is_fraud);
    }

    #[test]
    fn test_degraded_service_refuses_scoring() {
        let svc = ScoringService::new(
            ModelState::unavailable("missing artifact"),
            ThresholdConfig::default_fallback(),
        );

        assert!(matches!(
            svc.score(&record()),
            Err(ScoringError::ModelUnavailable)
        ));
        let health = svc.health();
        assert_eq!(health.status, "degraded");
        assert!(!health.model_loaded);
        assert_eq!(health.threshold, 0.98);
    }

    #[test]
    fn test_invalid_probability_is_evaluation_error() {
        assert!(matches!(
            service(FixedModel(f64::NAN), 0.5).score(&record()),
            Err(ScoringError::Evaluation(_))
        ));
        assert!(matches!(
            service(FixedModel(1.2), 0.5).score(&record()),
            Err(ScoringError::Evaluation(_))
        ));
    }

    #[test]
    fn test_invalid_record_is_rejected() {
        let bad = TransactionRecord::new(-5.0, 14, 0, 0, 0);

        assert!(matches!(
            service(FixedModel(0.1), 0.5).score(&bad),
            Err(ScoringError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_healthy_service_reports_threshold() {
        let health = service(FixedModel(0.1), 0.73).health();

        assert_eq!(health.status, "healthy");
        assert!(health.model_loaded);
        assert_eq!(health.threshold, 0.73);
    }

    #[test]
    fn test_concurrent_scoring_shares_service() {
        let svc = Arc::new(service(VelocityModel, 0.5));
        let handles: Vec<_> = (0..8u32)
            .map(|v| {
                let svc = svc.clone();
                std::thread::spawn(move || svc.score(&TransactionRecord::new(20.0, 14, 0, 0, v)))
            })
            .collect();

        for (v, handle) in handles.into_iter().enumerate() {
            let result = handle.join().unwrap().unwrap();
            assert_eq!(result.fraud_probability, v as f64 / 10.0);
        }
    }

    #[test]
    fn test_decision_carries_transaction_and_threshold() {
        let event = ScoringEvent {
            transaction_id: "tx_7".to_string(),
            record: record(),
        };

        let decision = service(FixedModel(0.99), 0.98).decide(&event).unwrap();

        assert_eq!(decision.transaction_id, "tx_7");
        assert_eq!(decision.threshold, 0.98);
        assert!(decision.result.is_fraud);
        assert!(!decision.escalated);
        assert!(decision.reasons.is_some());
        assert!(!decision.decision_id.is_empty());
    }

    #[test]
    fn test_rules_escalate_low_probability_event() {
        let event = ScoringEvent {
            transaction_id: "tx_dup".to_string(),
            record: TransactionRecord::new(1500.0, 2, 1, 1, 9),
        };

        let decision = service(FixedModel(0.05), 0.98).decide(&event).unwrap();

        assert!(!decision.result.is_fraud);
        assert!(decision.escalated);
        assert!(decision.is_flagged());
        let reasons = decision.reasons.unwrap();
        assert_eq!(reasons.ml_score, 0.05);
        assert_eq!(reasons.rules.len(), 3);
    }

    #[test]
    fn test_quiet_event_is_cleared_without_reasons() {
        let event = ScoringEvent {
            transaction_id: "tx_ok".to_string(),
            record: record(),
        };

        let decision = service(FixedModel(0.05), 0.98).decide(&event).unwrap();

        assert!(!decision.is_flagged());
        assert!(decision.reasons.is_none());
    }
}
