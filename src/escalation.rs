//! Rule-based escalation for streamed decisions.
//!
//! Some behaviour is suspicious regardless of the model's opinion: bursts of
//! activity, or large spends from a country and device the user has never
//! used. These rules can only add flags; they never clear a model flag.

use crate::types::transaction::TransactionRecord;
use serde::{Deserialize, Serialize};

/// Velocity above which a transaction is escalated
pub const VELOCITY_LIMIT: u32 = 8;

/// Amount above which a new country plus a new device is escalated
pub const NEW_COUNTRY_AND_DEVICE_AMOUNT: f64 = 500.0;

/// Amount above which a new country alone is escalated
pub const NEW_COUNTRY_AMOUNT: f64 = 1000.0;

/// A triggered escalation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationRule {
    /// `user_velocity_60s > 8`
    HighVelocity,
    /// New country, new device and `amount > 500`
    NewCountryAndDevice,
    /// New country and `amount > 1000`
    NewCountryLargeAmount,
}

impl EscalationRule {
    /// Rules triggered by `record`, in declaration order.
    pub fn triggered(record: &TransactionRecord) -> Vec<EscalationRule> {
        let new_country = record.country_novelty == 1;
        let new_device = record.device_novelty == 1;

        let mut rules = Vec::new();
        if record.user_velocity_60s > VELOCITY_LIMIT {
            rules.push(EscalationRule::HighVelocity);
        }
        if new_country && new_device && record.amount > NEW_COUNTRY_AND_DEVICE_AMOUNT {
            rules.push(EscalationRule::NewCountryAndDevice);
        }
        if new_country && record.amount > NEW_COUNTRY_AMOUNT {
            rules.push(EscalationRule::NewCountryLargeAmount);
        }
        rules
    }
}

/// Why a decision was flagged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagReasons {
    pub ml_score: f64,
    pub velocity: u32,
    pub new_country: bool,
    pub new_device: bool,
    pub amount: f64,
    /// Escalation rules that fired; empty when the model alone flagged
    pub rules: Vec<EscalationRule>,
}

impl FlagReasons {
    pub fn new(record: &TransactionRecord, ml_score: f64, rules: Vec<EscalationRule>) -> Self {
        Self {
            ml_score,
            velocity: record.user_velocity_60s,
            new_country: record.country_novelty == 1,
            new_device: record.device_novelty == 1,
            amount: record.amount,
            rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_transaction_triggers_nothing() {
        let record = TransactionRecord::new(1500.0, 2, 0, 1, 8);

        assert!(EscalationRule::triggered(&record).is_empty());
    }

    #[test]
    fn test_all_rules_fire_together() {
        let record = TransactionRecord::new(1500.0, 2, 1, 1, 9);

        assert_eq!(
            EscalationRule::triggered(&record),
            vec![
                EscalationRule::HighVelocity,
                EscalationRule::NewCountryAndDevice,
                EscalationRule::NewCountryLargeAmount,
            ]
        );
    }

    #[test]
    fn test_amount_limits_are_exclusive() {
        let at_device_limit = TransactionRecord::new(500.0, 12, 1, 1, 0);
        let over_device_limit = TransactionRecord::new(500.01, 12, 1, 1, 0);
        let at_country_limit = TransactionRecord::new(1000.0, 12, 1, 0, 0);

        assert!(EscalationRule::triggered(&at_device_limit).is_empty());
        assert_eq!(
            EscalationRule::triggered(&over_device_limit),
            vec![EscalationRule::NewCountryAndDevice]
        );
        assert!(EscalationRule::triggered(&at_country_limit).is_empty());
    }

    #[test]
    fn test_reasons_capture_record() {
        let record = TransactionRecord::new(1500.0, 2, 1, 0, 3);
        let reasons = FlagReasons::new(&record, 0.05, EscalationRule::triggered(&record));

        let json = serde_json::to_value(&reasons).unwrap();
        assert_eq!(json["ml_score"], 0.05);
        assert_eq!(json["new_country"], true);
        assert_eq!(json["new_device"], false);
        assert_eq!(json["rules"][0], "new_country_large_amount");
    }
}
