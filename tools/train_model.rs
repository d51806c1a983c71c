//! Offline trainer
//!
//! Generates the synthetic training set, fits and calibrates the model,
//! picks the operating threshold and writes both artifacts.

use anyhow::Context;
use clap::Parser;
use fraud_scoring::models::ForestParams;
use fraud_scoring::training::{
    synthetic, CalibrationTrainer, SyntheticConfig, TrainerConfig, TrainingReport,
    DEFAULT_TARGET_PRECISION,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "train-model", about = "Train and calibrate the fraud model")]
struct Args {
    /// Synthetic samples to generate
    #[arg(long, default_value_t = 200_000)]
    samples: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Minimum validation precision of the chosen threshold
    #[arg(long, default_value_t = DEFAULT_TARGET_PRECISION)]
    target_precision: f64,

    #[arg(long, default_value_t = 100)]
    trees: usize,

    #[arg(long, default_value_t = 14)]
    max_depth: usize,

    /// Training-loss weight of the fraud class
    #[arg(long, default_value_t = 4.0)]
    fraud_weight: f64,

    #[arg(long, default_value = "models/fraud_model.json")]
    model_out: PathBuf,

    #[arg(long, default_value = "models/threshold.json")]
    threshold_out: PathBuf,

    /// Optional JSON dump of the training report
    #[arg(long)]
    report_out: Option<PathBuf>,

    /// Emit JSON logs
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("train_model=info,fraud_scoring=info"),
    };
    if args.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(samples = args.samples, seed = args.seed, "Generating synthetic dataset");
    let dataset = synthetic::generate(&SyntheticConfig {
        samples: args.samples,
        seed: args.seed,
        ..SyntheticConfig::default()
    })?;

    let mut forest = ForestParams {
        n_trees: args.trees,
        max_depth: args.max_depth,
        seed: args.seed,
        ..ForestParams::default()
    };
    forest.class_weight.fraud = args.fraud_weight;

    let trainer = CalibrationTrainer::new(TrainerConfig {
        seed: args.seed,
        forest,
        target_precision: args.target_precision,
        ..TrainerConfig::default()
    });
    let outcome = trainer.train(&dataset).context("Training failed")?;

    log_report(&outcome.report);

    outcome
        .artifact
        .save(&args.model_out)
        .with_context(|| format!("Failed to write {}", args.model_out.display()))?;
    info!(path = %args.model_out.display(), "Model artifact saved");

    outcome.threshold.save(&args.threshold_out)?;
    info!(
        path = %args.threshold_out.display(),
        threshold = outcome.threshold.threshold,
        "Threshold saved"
    );

    if let Some(path) = &args.report_out {
        let json = serde_json::to_string_pretty(&outcome.report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Training report saved");
    }

    Ok(())
}

fn log_report(report: &TrainingReport) {
    info!("Classification report (test split, threshold {:.4}):", report.selection.threshold);
    info!("  {:>10} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1", "support");
    for (name, m) in [("legit", report.test_legit), ("fraud", report.test_fraud)] {
        info!(
            "  {:>10} {:>9.4} {:>9.4} {:>9.4} {:>9}",
            name, m.precision, m.recall, m.f1, m.support
        );
    }
    info!(
        average_precision = report.test_average_precision,
        "Test average precision: {:.4}",
        report.test_average_precision
    );

    info!("Feature importances:");
    for (name, importance) in &report.feature_importances {
        info!("  {:<20} {:.4}", name, importance);
    }

    if report.degenerate_class_balance {
        warn!(
            fraud_rate = report.fraud_rate,
            "Training data had very few fraud cases; treat these metrics with care"
        );
    }
    if !report.selection.met_target {
        warn!(
            threshold = report.selection.threshold,
            "Precision target not reached on validation; conservative threshold written"
        );
    }
}
