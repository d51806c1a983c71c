//! Precision-recall curve and classification metrics

use serde::Serialize;

/// Precision/recall pairs in increasing-threshold order.
///
/// `thresholds` has one entry fewer than `precisions`/`recalls`: the final
/// pair (precision 1, recall 0) stands for flagging nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecisionRecallCurve {
    pub precisions: Vec<f64>,
    pub recalls: Vec<f64>,
    pub thresholds: Vec<f64>,
}

/// Build the curve from scores and 0/1 labels.
///
/// Every distinct score is a candidate cut point; a sample is flagged when its
/// score is at or above the cut. Returns `None` when there are no positives,
/// since recall is undefined.
pub fn precision_recall_curve(labels: &[u8], scores: &[f64]) -> Option<PrecisionRecallCurve> {
    if labels.len() != scores.len() || labels.is_empty() {
        return None;
    }
    let total_positives = labels.iter().filter(|&&l| l == 1).count();
    if total_positives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    // Walk from the highest score down, emitting a point at each distinct score.
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut precisions = Vec::new();
    let mut recalls = Vec::new();
    let mut thresholds = Vec::new();
    for (pos, &i) in order.iter().enumerate() {
        if labels[i] == 1 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_score = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_score {
            precisions.push(tp as f64 / (tp + fp) as f64);
            recalls.push(tp as f64 / total_positives as f64);
            thresholds.push(scores[i]);
        }
    }

    precisions.reverse();
    recalls.reverse();
    thresholds.reverse();
    precisions.push(1.0);
    recalls.push(0.0);

    Some(PrecisionRecallCurve {
        precisions,
        recalls,
        thresholds,
    })
}

/// Area under the precision-recall curve as a step-wise sum of
/// precision times recall increments.
pub fn average_precision(labels: &[u8], scores: &[f64]) -> Option<f64> {
    let curve = precision_recall_curve(labels, scores)?;
    let n = curve.precisions.len();
    let ap = (0..n - 1)
        .map(|i| (curve.recalls[i] - curve.recalls[i + 1]) * curve.precisions[i])
        .sum();
    Some(ap)
}

/// Confusion counts at a fixed threshold (flag when score >= threshold)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionCounts {
    pub fn at_threshold(labels: &[u8], scores: &[f64], threshold: f64) -> Self {
        let mut counts = Self::default();
        for (&label, &score) in labels.iter().zip(scores) {
            match (score >= threshold, label == 1) {
                (true, true) => counts.true_positives += 1,
                (true, false) => counts.false_positives += 1,
                (false, false) => counts.true_negatives += 1,
                (false, true) => counts.false_negatives += 1,
            }
        }
        counts
    }

    fn ratio(num: usize, den: usize) -> f64 {
        if den == 0 {
            0.0
        } else {
            num as f64 / den as f64
        }
    }

    /// Zero when nothing is flagged
    pub fn precision(&self) -> f64 {
        Self::ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        Self::ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Precision/recall/F1 for the legitimate class
    pub fn legit_metrics(&self) -> ClassMetrics {
        let precision = Self::ratio(self.true_negatives, self.true_negatives + self.false_negatives);
        let recall = Self::ratio(self.true_negatives, self.true_negatives + self.false_positives);
        ClassMetrics {
            precision,
            recall,
            f1: if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            },
            support: self.true_negatives + self.false_positives,
        }
    }

    pub fn fraud_metrics(&self) -> ClassMetrics {
        ClassMetrics {
            precision: self.precision(),
            recall: self.recall(),
            f1: self.f1(),
            support: self.true_positives + self.false_negatives,
        }
    }
}

/// Per-class row of a classification report
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}
