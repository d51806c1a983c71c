//! Feature extraction shared by training and online scoring.
//!
//! The trainer and the scorer both go through [`FeatureExtractor::extract`];
//! the amount scaler is persisted inside the model artifact so the two paths
//! can never disagree on centering constants.

use crate::types::transaction::TransactionRecord;
use serde::{Deserialize, Serialize};

/// Number of features produced per transaction
pub const FEATURE_COUNT: usize = 7;

/// Feature names in model input order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "amount",
    "hour",
    "country_novelty",
    "device_novelty",
    "user_velocity_60s",
    "amount_zscore",
    "is_night",
];

/// Fixed-order model input
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Centering constants for `amount_zscore`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmountScaler {
    pub mean: f64,
    pub std: f64,
}

impl AmountScaler {
    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }

    /// Fit mean and population standard deviation over training amounts.
    ///
    /// A zero or non-finite spread degrades to unit scale.
    pub fn fit(amounts: &[f64]) -> Self {
        if amounts.is_empty() {
            return Self::default();
        }
        let n = amounts.len() as f64;
        let mean = amounts.iter().sum::<f64>() / n;
        let variance = amounts.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        let std = if std.is_finite() && std > f64::EPSILON {
            std
        } else {
            1.0
        };
        Self { mean, std }
    }

    pub fn zscore(&self, amount: f64) -> f64 {
        (amount - self.mean) / self.std
    }
}

impl Default for AmountScaler {
    /// Rough centering used before artifacts carried their own scaler.
    fn default() -> Self {
        Self {
            mean: 100.0,
            std: 200.0,
        }
    }
}

/// Night window: 23:00 through 05:59
pub fn is_night(hour: u8) -> bool {
    hour >= 23 || hour <= 5
}

/// Feature extractor that transforms transactions into model input features.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureExtractor {
    scaler: AmountScaler,
}

impl FeatureExtractor {
    pub fn new(scaler: AmountScaler) -> Self {
        Self { scaler }
    }

    pub fn scaler(&self) -> &AmountScaler {
        &self.scaler
    }

    /// Extract features from a transaction, in [`FEATURE_NAMES`] order.
    pub fn extract(&self, record: &TransactionRecord) -> FeatureVector {
        [
            record.amount,
            f64::from(record.hour),
            f64::from(record.country_novelty),
            f64::from(record.device_novelty),
            f64::from(record.user_velocity_60s),
            self.scaler.zscore(record.amount),
            if is_night(record.hour) { 1.0 } else { 0.0 },
        ]
    }

    /// Extract a whole batch, preserving order.
    pub fn extract_all(&self, records: &[TransactionRecord]) -> Vec<FeatureVector> {
        records.iter().map(|r| self.extract(r)).collect()
    }

    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn feature_names(&self) -> Vec<&'static str> {
        FEATURE_NAMES.to_vec()
    }
}
