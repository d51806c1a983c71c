//! Model components: base learner, calibration, persistence and loading

pub mod artifact;
pub mod forest;
pub mod isotonic;
pub mod loader;

pub use artifact::{ArtifactProvenance, ModelArtifact, ARTIFACT_FORMAT_VERSION};
pub use forest::{ClassWeight, ForestParams, RandomForest};
pub use isotonic::IsotonicCalibrator;
pub use loader::{ModelLoader, ModelState};

use crate::feature_extractor::FeatureVector;

/// Anything that turns a feature vector into a fraud probability.
///
/// Implementations are shared across concurrent requests, so inference must
/// be safe to call through `&self` from many threads at once.
pub trait ProbabilityModel: Send + Sync {
    /// Fraud probability in [0, 1]. Implementations may return NaN on
    /// internal failure; callers treat non-finite output as an evaluation error.
    fn predict_probability(&self, features: &FeatureVector) -> f64;
}
