//! Operating-threshold selection on the precision-recall curve.
//!
//! False positives block legitimate customers and are budgeted through a
//! precision floor; within that budget the cut point with the most recall wins.

use crate::training::curve::PrecisionRecallCurve;
use serde::Serialize;

/// Precision the operating point must reach by default
pub const DEFAULT_TARGET_PRECISION: f64 = 0.90;

/// Threshold used when no cut point reaches the target
pub const FALLBACK_THRESHOLD: f64 = 0.99;

/// Chosen operating point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdSelection {
    pub threshold: f64,
    pub target_precision: f64,
    /// Precision at the chosen cut point; `None` on fallback
    pub precision: Option<f64>,
    /// Recall at the chosen cut point; `None` on fallback
    pub recall: Option<f64>,
    pub met_target: bool,
}

impl ThresholdSelection {
    fn fallback(target_precision: f64) -> Self {
        Self {
            threshold: FALLBACK_THRESHOLD,
            target_precision,
            precision: None,
            recall: None,
            met_target: false,
        }
    }
}

/// Pick the highest-recall cut point whose precision reaches `target_precision`.
///
/// Thresholds are padded with their last value to line up with the
/// precision/recall pairs. Ties on recall keep the lowest threshold.
///
/// Every pair with zero recall is skipped, including the boundary pair
/// (precision 1, recall 0). That pair would otherwise always qualify and
/// select the padded maximum score as the cut, a threshold that flags
/// nothing. Skipping it deliberately departs from that max-score cut: when
/// no pair with positive recall reaches the target, [`FALLBACK_THRESHOLD`]
/// is returned instead.
pub fn select_threshold(curve: &PrecisionRecallCurve, target_precision: f64) -> ThresholdSelection {
    let Some(&last) = curve.thresholds.last() else {
        return ThresholdSelection::fallback(target_precision);
    };
    let padded = curve
        .thresholds
        .iter()
        .copied()
        .chain(std::iter::repeat(last))
        .take(curve.precisions.len());

    let mut best: Option<ThresholdSelection> = None;
    for ((&precision, &recall), threshold) in curve.precisions.iter().zip(&curve.recalls).zip(padded) {
        if precision < target_precision || recall <= 0.0 {
            continue;
        }
        if best.map_or(true, |b| recall > b.recall.unwrap_or(f64::NEG_INFINITY)) {
            best = Some(ThresholdSelection {
                threshold,
                target_precision,
                precision: Some(precision),
                recall: Some(recall),
                met_target: true,
            });
        }
    }

    best.unwrap_or_else(|| ThresholdSelection::fallback(target_precision))
}
