//! Startup loading of the model artifact

use crate::feature_extractor::FeatureExtractor;
use crate::models::artifact::ModelArtifact;
use crate::models::ProbabilityModel;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of loading the model at startup. Fixed for the process lifetime.
#[derive(Clone)]
pub enum ModelState {
    /// Model ready, paired with the transform it was trained with
    Ready {
        model: Arc<dyn ProbabilityModel>,
        extractor: FeatureExtractor,
    },
    /// Loading failed; every scoring request is refused until restart
    Unavailable { reason: String },
}

impl ModelState {
    pub fn ready(model: Arc<dyn ProbabilityModel>, extractor: FeatureExtractor) -> Self {
        ModelState::Ready { model, extractor }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        ModelState::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelState::Ready { .. })
    }
}

impl std::fmt::Debug for ModelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelState::Ready { extractor, .. } => f
                .debug_struct("Ready")
                .field("extractor", extractor)
                .finish_non_exhaustive(),
            ModelState::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Loader for the persisted model artifact
pub struct ModelLoader {
    path: PathBuf,
}

impl ModelLoader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the artifact, degrading instead of failing when it is unusable.
    pub fn load(&self) -> ModelState {
        info!(path = %self.path.display(), "Loading model artifact");

        match ModelArtifact::load(&self.path) {
            Ok(artifact) => {
                let scaler = *artifact.feature_extractor().scaler();
                info!(
                    trees = artifact.base_model.trees().len(),
                    calibration_points = artifact.calibrator.breakpoints().len(),
                    amount_mean = scaler.mean,
                    amount_std = scaler.std,
                    trained_at = %artifact.provenance.trained_at,
                    "Model loaded successfully"
                );
                let extractor = *artifact.feature_extractor();
                ModelState::ready(Arc::new(artifact), extractor)
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to load model, service will run degraded"
                );
                ModelState::unavailable(e.to_string())
            }
        }
    }
}
