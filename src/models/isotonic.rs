//! Isotonic probability calibration.
//!
//! Fits a non-decreasing step function from raw base-model scores to observed
//! fraud frequency with the pool-adjacent-violators algorithm, then
//! interpolates linearly between breakpoints at prediction time. Scores
//! outside the fitted range are clipped to the nearest end.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("cannot calibrate on an empty sample")]
    Empty,

    #[error("scores and labels differ in length ({scores} vs {labels})")]
    LengthMismatch { scores: usize, labels: usize },

    #[error("non-finite raw score at row {0}")]
    NonFinite(usize),
}

/// Monotone calibration map from raw score to probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicCalibrator {
    /// Strictly increasing raw-score breakpoints
    breakpoints: Vec<f64>,
    /// Calibrated probability at each breakpoint (non-decreasing, in [0, 1])
    values: Vec<f64>,
}

struct Block {
    sum: f64,
    weight: f64,
    /// Number of distinct raw scores pooled into this block
    span: usize,
}

impl Block {
    fn mean(&self) -> f64 {
        self.sum / self.weight
    }
}

impl IsotonicCalibrator {
    /// Fit on raw scores and 0/1 labels from data disjoint from the base
    /// model's training sample.
    pub fn fit(scores: &[f64], labels: &[u8]) -> Result<Self, CalibrationError> {
        if scores.is_empty() {
            return Err(CalibrationError::Empty);
        }
        if scores.len() != labels.len() {
            return Err(CalibrationError::LengthMismatch {
                scores: scores.len(),
                labels: labels.len(),
            });
        }
        if let Some(row) = scores.iter().position(|s| !s.is_finite()) {
            return Err(CalibrationError::NonFinite(row));
        }

        let mut pairs: Vec<(f64, f64)> = scores
            .iter()
            .zip(labels)
            .map(|(&s, &l)| (s, if l == 1 { 1.0 } else { 0.0 }))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Tied raw scores collapse into one point carrying their mean label.
        let mut xs: Vec<f64> = Vec::new();
        let mut points: Vec<Block> = Vec::new();
        for (x, y) in pairs {
            if xs.last() == Some(&x) {
                if let Some(last) = points.last_mut() {
                    last.sum += y;
                    last.weight += 1.0;
                }
            } else {
                xs.push(x);
                points.push(Block {
                    sum: y,
                    weight: 1.0,
                    span: 1,
                });
            }
        }

        let mut pooled: Vec<Block> = Vec::with_capacity(points.len());
        for point in points {
            pooled.push(point);
            while pooled.len() >= 2 {
                let n = pooled.len();
                if pooled[n - 2].mean() <= pooled[n - 1].mean() {
                    break;
                }
                if let Some(top) = pooled.pop() {
                    if let Some(prev) = pooled.last_mut() {
                        prev.sum += top.sum;
                        prev.weight += top.weight;
                        prev.span += top.span;
                    }
                }
            }
        }

        let mut fitted = Vec::with_capacity(xs.len());
        for block in &pooled {
            let mean = block.mean().clamp(0.0, 1.0);
            fitted.extend(std::iter::repeat(mean).take(block.span));
        }

        // Interior points of a constant run add nothing to the interpolation.
        let mut breakpoints = Vec::new();
        let mut values = Vec::new();
        for i in 0..xs.len() {
            let same_as_prev = i > 0 && fitted[i - 1] == fitted[i];
            let same_as_next = i + 1 < xs.len() && fitted[i + 1] == fitted[i];
            if !(same_as_prev && same_as_next) {
                breakpoints.push(xs[i]);
                values.push(fitted[i]);
            }
        }

        Ok(Self {
            breakpoints,
            values,
        })
    }

    /// Calibrated probability for a raw score. Non-finite input yields NaN.
    pub fn predict(&self, raw_score: f64) -> f64 {
        if !raw_score.is_finite() || self.breakpoints.is_empty() {
            return f64::NAN;
        }
        let last = self.breakpoints.len() - 1;
        if raw_score <= self.breakpoints[0] {
            return self.values[0];
        }
        if raw_score >= self.breakpoints[last] {
            return self.values[last];
        }

        let upper = self.breakpoints.partition_point(|&b| b <= raw_score);
        let lower = upper - 1;
        let (x0, x1) = (self.breakpoints[lower], self.breakpoints[upper]);
        let (y0, y1) = (self.values[lower], self.values[upper]);
        let t = (raw_score - x0) / (x1 - x0);
        (y0 + t * (y1 - y0)).clamp(0.0, 1.0)
    }

    pub fn breakpoints(&self) -> &[f64] {
        &self.breakpoints
    }

    /// Structural check for calibrators read back from storage.
    pub fn validate(&self) -> Result<(), String> {
        if self.breakpoints.is_empty() {
            return Err("calibrator has no breakpoints".into());
        }
        if self.breakpoints.len() != self.values.len() {
            return Err(format!(
                "calibrator has {} breakpoints but {} values",
                self.breakpoints.len(),
                self.values.len()
            ));
        }
        if self.breakpoints.iter().any(|b| !b.is_finite())
            || self.breakpoints.windows(2).any(|w| w[0] >= w[1])
        {
            return Err("calibrator breakpoints must be finite and strictly increasing".into());
        }
        if self.values.iter().any(|v| !(0.0..=1.0).contains(v))
            || self.values.windows(2).any(|w| w[0] > w[1])
        {
            return Err("calibrator values must be non-decreasing within [0, 1]".into());
        }
        Ok(())
    }
}
