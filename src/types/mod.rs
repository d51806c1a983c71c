//! Type definitions shared by the trainer and the scoring service

pub mod score;
pub mod transaction;

pub use score::{Confidence, HealthStatus, ScoreDecision, ScoreResult};
pub use transaction::{ScoringEvent, TransactionRecord, ValidationError};
