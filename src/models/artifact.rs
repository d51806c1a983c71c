//! Persisted calibrated model.
//!
//! The artifact carries the feature transform's centering constants next to
//! the forest and its calibrator, so whoever loads it scores with exactly the
//! transform the model was trained on.

use crate::error::ArtifactError;
use crate::feature_extractor::{FeatureExtractor, FeatureVector, FEATURE_NAMES};
use crate::models::forest::RandomForest;
use crate::models::isotonic::IsotonicCalibrator;
use crate::models::ProbabilityModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Current on-disk layout version
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Where and how the artifact was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactProvenance {
    pub trained_at: DateTime<Utc>,
    pub seed: u64,
    pub train_size: usize,
    pub validation_size: usize,
    pub test_size: usize,
    pub train_fraud_rate: f64,
}

/// Calibrated classifier plus the transform it expects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub feature_names: Vec<String>,
    pub feature_extractor: FeatureExtractor,
    pub base_model: RandomForest,
    pub calibrator: IsotonicCalibrator,
    pub provenance: ArtifactProvenance,
}

impl ModelArtifact {
    pub fn new(
        feature_extractor: FeatureExtractor,
        base_model: RandomForest,
        calibrator: IsotonicCalibrator,
        provenance: ArtifactProvenance,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            feature_extractor,
            base_model,
            calibrator,
            provenance,
        }
    }

    pub fn feature_extractor(&self) -> &FeatureExtractor {
        &self.feature_extractor
    }

    /// Uncalibrated base-model score
    pub fn raw_score(&self, features: &FeatureVector) -> f64 {
        self.base_model.predict_probability(features)
    }

    /// Check version, feature layout and structural soundness.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: self.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }
        if !self.feature_names.iter().map(String::as_str).eq(FEATURE_NAMES) {
            return Err(ArtifactError::FeatureLayout {
                found: self.feature_names.clone(),
            });
        }
        let scaler = self.feature_extractor.scaler();
        if !scaler.mean.is_finite() || !scaler.std.is_finite() || scaler.std <= 0.0 {
            return Err(ArtifactError::Invalid(format!(
                "amount scaler ({}, {}) is unusable",
                scaler.mean, scaler.std
            )));
        }
        self.base_model.validate().map_err(ArtifactError::Invalid)?;
        self.calibrator.validate().map_err(ArtifactError::Invalid)?;
        Ok(())
    }

    /// Write the artifact as JSON, creating parent directories as needed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ArtifactError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ArtifactError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let bytes = serde_json::to_vec(self).map_err(ArtifactError::Serialize)?;
        fs::write(path, bytes).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Model artifact written");
        Ok(())
    }

    /// Read and validate an artifact.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: Self = serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        artifact.validate()?;
        Ok(artifact)
    }
}

impl ProbabilityModel for ModelArtifact {
    fn predict_probability(&self, features: &FeatureVector) -> f64 {
        self.calibrator.predict(self.raw_score(features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::AmountScaler;
    use crate::models::forest::ForestParams;
    use crate::types::TransactionRecord;

    fn tiny_artifact() -> ModelArtifact {
        let extractor = FeatureExtractor::new(AmountScaler::new(100.0, 50.0));
        let records: Vec<TransactionRecord> = (0..120)
            .map(|i| TransactionRecord::new(10.0 + i as f64, (i % 24) as u8, (i % 2) as u8, 0, 0))
            .collect();
        let labels: Vec<u8> = (0..120).map(|i| u8::from(i % 2 == 1)).collect();
        let features = extractor.extract_all(&records);
        let params = ForestParams {
            n_trees: 3,
            max_depth: 3,
            min_samples_split: 4,
            min_samples_leaf: 2,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&features, &labels, &params).unwrap();
        let raw = forest.predict_all(&features);
        let calibrator = IsotonicCalibrator::fit(&raw, &labels).unwrap();

        ModelArtifact::new(
            extractor,
            forest,
            calibrator,
            ArtifactProvenance {
                trained_at: Utc::now(),
                seed: 42,
                train_size: 120,
                validation_size: 120,
                test_size: 0,
                train_fraud_rate: 0.5,
            },
        )
    }

    #[test]
    fn test_save_and_load_preserve_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let artifact = tiny_artifact();

        artifact.save(&path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();

        let record = TransactionRecord::new(57.0, 3, 1, 0, 0);
        let features = loaded.feature_extractor().extract(&record);
        assert_eq!(
            loaded.predict_probability(&features),
            artifact.predict_probability(&features)
        );
        assert_eq!(loaded.feature_extractor(), artifact.feature_extractor());
    }

    #[test]
    fn test_load_rejects_feature_layout_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut artifact = tiny_artifact();
        artifact.feature_names.swap(0, 1);
        artifact.save(&path).unwrap();

        assert!(matches!(
            ModelArtifact::load(&path),
            Err(ArtifactError::FeatureLayout { .. })
        ));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut artifact = tiny_artifact();
        artifact.format_version = 99;
        artifact.save(&path).unwrap();

        assert!(matches!(
            ModelArtifact::load(&path),
            Err(ArtifactError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_load_reports_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(
            ModelArtifact::load(&missing),
            Err(ArtifactError::Io { .. })
        ));

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, b"{not json").unwrap();
        assert!(matches!(
            ModelArtifact::load(&corrupt),
            Err(ArtifactError::Parse { .. })
        ));
    }
}
