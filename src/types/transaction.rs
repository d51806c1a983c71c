//! Transaction data structures for fraud scoring

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A payment transaction as seen by the scorer.
///
/// Velocity and novelty flags arrive precomputed by whoever owns the
/// per-user history; the scorer never derives them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction amount (positive, currency-agnostic units)
    pub amount: f64,

    /// Hour of day, 0-23
    pub hour: u8,

    /// 1 when the transaction country differs from the user's usual country
    #[serde(alias = "new_country")]
    pub country_novelty: u8,

    /// 1 when the device differs from the user's usual device
    #[serde(alias = "new_device")]
    pub device_novelty: u8,

    /// Number of the user's transactions in the preceding 60 seconds
    #[serde(alias = "velocity")]
    pub user_velocity_60s: u32,
}

/// Boundary validation failures for a [`TransactionRecord`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("amount must be a positive finite number, got {0}")]
    Amount(f64),

    #[error("hour must be within 0..=23, got {0}")]
    Hour(u8),

    #[error("{field} must be 0 or 1, got {value}")]
    Flag { field: &'static str, value: u8 },
}

impl TransactionRecord {
    /// Create a new record
    pub fn new(
        amount: f64,
        hour: u8,
        country_novelty: u8,
        device_novelty: u8,
        user_velocity_60s: u32,
    ) -> Self {
        Self {
            amount,
            hour,
            country_novelty,
            device_novelty,
            user_velocity_60s,
        }
    }

    /// Check the record against the input contract.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ValidationError::Amount(self.amount));
        }
        if self.hour > 23 {
            return Err(ValidationError::Hour(self.hour));
        }
        if self.country_novelty > 1 {
            return Err(ValidationError::Flag {
                field: "country_novelty",
                value: self.country_novelty,
            });
        }
        if self.device_novelty > 1 {
            return Err(ValidationError::Flag {
                field: "device_novelty",
                value: self.device_novelty,
            });
        }
        Ok(())
    }
}

/// A scoring request travelling over the message bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringEvent {
    /// Upstream transaction identifier
    #[serde(alias = "txn_id")]
    pub transaction_id: String,

    #[serde(flatten)]
    pub record: TransactionRecord,
}
