//! Offline calibration trainer.
//!
//! Split, fit the base forest on train, calibrate on validation, choose the
//! operating threshold on validation, report on test. Each stage only sees
//! the partition it is allowed to see.

use crate::error::TrainingError;
use crate::feature_extractor::{AmountScaler, FeatureExtractor, FEATURE_NAMES};
use crate::models::artifact::{ArtifactProvenance, ModelArtifact};
use crate::models::forest::{ForestParams, RandomForest};
use crate::models::isotonic::IsotonicCalibrator;
use crate::models::ProbabilityModel;
use crate::threshold::ThresholdArtifact;
use crate::training::curve::{
    average_precision, precision_recall_curve, ClassMetrics, ConfusionCounts,
};
use crate::training::dataset::{stratified_split, Dataset, SplitRatios};
use crate::training::threshold_search::{
    select_threshold, ThresholdSelection, DEFAULT_TARGET_PRECISION,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

/// Trainer settings
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub ratios: SplitRatios,
    /// Seed for partitioning; the forest carries its own seed
    pub seed: u64,
    pub forest: ForestParams,
    pub target_precision: f64,
    /// Fraud rate below which the dataset is reported as degenerate
    pub min_fraud_rate: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            ratios: SplitRatios::default(),
            seed: 42,
            forest: ForestParams::default(),
            target_precision: DEFAULT_TARGET_PRECISION,
            min_fraud_rate: 0.01,
        }
    }
}

/// Summary of one training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub dataset_size: usize,
    pub fraud_rate: f64,
    /// Fraud rate fell below the configured minimum; the model may have learned little
    pub degenerate_class_balance: bool,
    pub train_size: usize,
    pub validation_size: usize,
    pub test_size: usize,
    pub selection: ThresholdSelection,
    pub test_average_precision: f64,
    pub test_counts: ConfusionCounts,
    pub test_legit: ClassMetrics,
    pub test_fraud: ClassMetrics,
    /// Base-model importances, most important first
    pub feature_importances: Vec<(String, f64)>,
}

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub threshold: ThresholdArtifact,
    pub report: TrainingReport,
}

pub struct CalibrationTrainer {
    config: TrainerConfig,
}

impl CalibrationTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn train(&self, dataset: &Dataset) -> Result<TrainingOutcome, TrainingError> {
        let config = &self.config;
        if !(config.target_precision > 0.0 && config.target_precision <= 1.0) {
            return Err(TrainingError::InvalidConfig(format!(
                "target precision {} outside (0, 1]",
                config.target_precision
            )));
        }
        if dataset.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }

        let fraud_rate = dataset.fraud_rate();
        let degenerate = fraud_rate < config.min_fraud_rate;
        info!(
            samples = dataset.len(),
            fraud = dataset.positives(),
            fraud_rate = fraud_rate,
            "Training dataset loaded"
        );
        if degenerate {
            warn!(
                fraud_rate = fraud_rate,
                min_fraud_rate = config.min_fraud_rate,
                "Fraud rate too low, model may not learn"
            );
        }

        let split = stratified_split(dataset, config.ratios, config.seed)?;
        for (name, part) in [
            ("train", &split.train),
            ("validation", &split.validation),
            ("test", &split.test),
        ] {
            if part.positives() == 0 {
                return Err(TrainingError::MissingClass {
                    split: name,
                    class: "fraud",
                });
            }
            if part.positives() == part.len() {
                return Err(TrainingError::MissingClass {
                    split: name,
                    class: "legitimate",
                });
            }
        }
        info!(
            train = split.train.len(),
            validation = split.validation.len(),
            test = split.test.len(),
            "Stratified split complete"
        );

        // Centering constants come from the training partition only and
        // travel with the artifact.
        let amounts: Vec<f64> = split.train.records.iter().map(|r| r.amount).collect();
        let extractor = FeatureExtractor::new(AmountScaler::fit(&amounts));

        let x_train = extractor.extract_all(&split.train.records);
        info!(
            trees = config.forest.n_trees,
            max_depth = config.forest.max_depth,
            fraud_weight = config.forest.class_weight.fraud,
            "Fitting base forest"
        );
        let forest = RandomForest::fit(&x_train, &split.train.labels, &config.forest)?;

        let x_val = extractor.extract_all(&split.validation.records);
        let raw_val = forest.predict_all(&x_val);
        info!("Calibrating probabilities (isotonic)");
        let calibrator = IsotonicCalibrator::fit(&raw_val, &split.validation.labels)?;

        let artifact = ModelArtifact::new(
            extractor,
            forest,
            calibrator,
            ArtifactProvenance {
                trained_at: Utc::now(),
                seed: config.seed,
                train_size: split.train.len(),
                validation_size: split.validation.len(),
                test_size: split.test.len(),
                train_fraud_rate: split.train.fraud_rate(),
            },
        );

        let p_val: Vec<f64> = x_val.iter().map(|x| artifact.predict_probability(x)).collect();
        let curve = precision_recall_curve(&split.validation.labels, &p_val).ok_or_else(|| {
            TrainingError::Evaluation("validation precision-recall curve is undefined".into())
        })?;
        let selection = select_threshold(&curve, config.target_precision);
        if selection.met_target {
            info!(
                threshold = selection.threshold,
                target_precision = config.target_precision,
                validation_precision = selection.precision,
                validation_recall = selection.recall,
                "Operating threshold chosen"
            );
        } else {
            warn!(
                threshold = selection.threshold,
                target_precision = config.target_precision,
                "No cut point reached the precision target, using fallback threshold"
            );
        }

        let x_test = extractor.extract_all(&split.test.records);
        let p_test: Vec<f64> = x_test.iter().map(|x| artifact.predict_probability(x)).collect();
        let test_average_precision = average_precision(&split.test.labels, &p_test)
            .ok_or_else(|| TrainingError::Evaluation("test average precision is undefined".into()))?;
        let test_counts =
            ConfusionCounts::at_threshold(&split.test.labels, &p_test, selection.threshold);
        info!(
            average_precision = test_average_precision,
            precision = test_counts.precision(),
            recall = test_counts.recall(),
            f1 = test_counts.f1(),
            "Test split evaluation"
        );

        let mut feature_importances: Vec<(String, f64)> = FEATURE_NAMES
            .iter()
            .zip(artifact.base_model.feature_importances())
            .map(|(name, &v)| (name.to_string(), v))
            .collect();
        feature_importances.sort_by(|a, b| b.1.total_cmp(&a.1));

        let threshold = ThresholdArtifact {
            target_precision: Some(config.target_precision),
            validation_precision: selection.precision,
            validation_recall: selection.recall,
            met_target: Some(selection.met_target),
            selected_at: Some(Utc::now()),
            ..ThresholdArtifact::new(selection.threshold)
        };

        let report = TrainingReport {
            dataset_size: dataset.len(),
            fraud_rate,
            degenerate_class_balance: degenerate,
            train_size: split.train.len(),
            validation_size: split.validation.len(),
            test_size: split.test.len(),
            selection,
            test_average_precision,
            test_counts,
            test_legit: test_counts.legit_metrics(),
            test_fraud: test_counts.fraud_metrics(),
            feature_importances,
        };

        Ok(TrainingOutcome {
            artifact,
            threshold,
            report,
        })
    }
}
