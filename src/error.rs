//! Error types for artifact handling, scoring and training

use crate::models::forest::FitError;
use crate::models::isotonic::CalibrationError;
use crate::types::transaction::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures reading or writing the model artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to access model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize model artifact: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("unsupported artifact format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("artifact feature layout {found:?} does not match the feature transform")]
    FeatureLayout { found: Vec<String> },

    #[error("invalid model artifact: {0}")]
    Invalid(String),
}

/// Failures reading a threshold override. Always recovered by falling back.
#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("failed to read threshold file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse threshold file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("threshold value {0:?} is not a number")]
    NotANumber(String),

    #[error("threshold {0} outside [0, 1]")]
    OutOfRange(f64),
}

/// Per-request scoring failures
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("model not available")]
    ModelUnavailable,

    #[error("invalid transaction: {0}")]
    InvalidRecord(#[from] ValidationError),

    #[error("scoring failed: {0}")]
    Evaluation(String),
}

/// Failures of the offline calibration trainer
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("training dataset is empty")]
    EmptyDataset,

    #[error("dataset has {records} records but {labels} labels")]
    LengthMismatch { records: usize, labels: usize },

    #[error("{split} split has no {class} examples")]
    MissingClass {
        split: &'static str,
        class: &'static str,
    },

    #[error("invalid trainer configuration: {0}")]
    InvalidConfig(String),

    #[error("base model fit failed: {0}")]
    Fit(#[from] FitError),

    #[error("probability calibration failed: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("evaluation failed: {0}")]
    Evaluation(String),
}
