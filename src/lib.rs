//! Fraud Scoring Library
//!
//! Calibrated fraud probability for single transactions: a shared feature
//! transform, an offline trainer that fits and calibrates a class-weighted
//! forest and picks a precision-targeted operating threshold, and an online
//! scoring service exposed over HTTP and NATS.

pub mod api;
pub mod config;
pub mod consumer;
pub mod dedup;
pub mod error;
pub mod escalation;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod scoring;
pub mod threshold;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use error::{ArtifactError, ScoringError, ThresholdError, TrainingError};
pub use feature_extractor::{AmountScaler, FeatureExtractor, FeatureVector};
pub use models::{ModelArtifact, ModelLoader, ModelState, ProbabilityModel};
pub use scoring::ScoringService;
pub use threshold::{ThresholdConfig, ThresholdLoader};
pub use types::{score::ScoreResult, transaction::TransactionRecord};
