//! Offline training: synthetic data, partitioning, base model fit,
//! calibration, threshold search and evaluation.

pub mod curve;
pub mod dataset;
pub mod synthetic;
pub mod threshold_search;
pub mod trainer;

pub use curve::{average_precision, precision_recall_curve, ConfusionCounts, PrecisionRecallCurve};
pub use dataset::{stratified_split, Dataset, DatasetSplit, SplitRatios};
pub use synthetic::SyntheticConfig;
pub use threshold_search::{select_threshold, ThresholdSelection, DEFAULT_TARGET_PRECISION, FALLBACK_THRESHOLD};
pub use trainer::{CalibrationTrainer, TrainerConfig, TrainingOutcome, TrainingReport};
