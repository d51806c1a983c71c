//! Class-weighted random forest used as the base probabilistic classifier.
//!
//! Trees are grown on bootstrap samples with weighted Gini impurity. Split
//! candidates come from per-feature quantile cuts fitted once on the training
//! matrix, so each node only needs a histogram pass over its samples.

use crate::feature_extractor::{FeatureVector, FEATURE_COUNT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-class sample weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassWeight {
    pub legit: f64,
    pub fraud: f64,
}

impl ClassWeight {
    fn of(&self, label: u8) -> f64 {
        if label == 1 {
            self.fraud
        } else {
            self.legit
        }
    }
}

impl Default for ClassWeight {
    /// Missed fraud costs more than a false alarm, but only moderately so
    /// the fitted scores stay biased toward precision.
    fn default() -> Self {
        Self {
            legit: 1.0,
            fraud: 4.0,
        }
    }
}

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means `ceil(sqrt(FEATURE_COUNT))`
    pub max_features: Option<usize>,
    /// Upper bound on histogram bins per feature
    pub n_bins: usize,
    pub class_weight: ClassWeight,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 14,
            min_samples_split: 20,
            min_samples_leaf: 10,
            max_features: None,
            n_bins: 64,
            class_weight: ClassWeight::default(),
            seed: 42,
        }
    }
}

impl ForestParams {
    fn resolved_max_features(&self) -> usize {
        self.max_features
            .unwrap_or_else(|| (FEATURE_COUNT as f64).sqrt().ceil() as usize)
    }

    fn check(&self) -> Result<(), FitError> {
        if self.n_trees == 0 {
            return Err(FitError::InvalidParams("n_trees must be at least 1".into()));
        }
        if self.max_depth == 0 {
            return Err(FitError::InvalidParams("max_depth must be at least 1".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(FitError::InvalidParams(
                "min_samples_leaf must be at least 1".into(),
            ));
        }
        if !(2..=1024).contains(&self.n_bins) {
            return Err(FitError::InvalidParams(format!(
                "n_bins must be within 2..=1024, got {}",
                self.n_bins
            )));
        }
        let max_features = self.resolved_max_features();
        if max_features == 0 || max_features > FEATURE_COUNT {
            return Err(FitError::InvalidParams(format!(
                "max_features must be within 1..={FEATURE_COUNT}, got {max_features}"
            )));
        }
        let ClassWeight { legit, fraud } = self.class_weight;
        if !(legit.is_finite() && fraud.is_finite() && legit > 0.0 && fraud > 0.0) {
            return Err(FitError::InvalidParams(
                "class weights must be positive and finite".into(),
            ));
        }
        Ok(())
    }
}

/// Failures while fitting the forest
#[derive(Debug, Error)]
pub enum FitError {
    #[error("cannot fit on an empty sample")]
    Empty,

    #[error("features and labels differ in length ({features} vs {labels})")]
    LengthMismatch { features: usize, labels: usize },

    #[error("label at row {row} is {label}, expected 0 or 1")]
    InvalidLabel { row: usize, label: u8 },

    #[error("non-finite feature value at row {row}, column {column}")]
    NonFinite { row: usize, column: usize },

    #[error("invalid forest parameter: {0}")]
    InvalidParams(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Single CART tree stored as an arena; the root is node 0 and children
/// always sit after their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                None => return f64::NAN,
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } => {
                    if !(0.0..=1.0).contains(value) {
                        return Err(format!("leaf {idx} value {value} outside [0, 1]"));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= FEATURE_COUNT {
                        return Err(format!("node {idx} splits on unknown feature {feature}"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {idx} has a non-finite threshold"));
                    }
                    for child in [left, right] {
                        if *child <= idx || *child >= self.nodes.len() {
                            return Err(format!("node {idx} has invalid child {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Quantile cut points per feature. A value falls left of cut `k` iff
/// `value <= cuts[k]`, which is exactly `bin(value) <= k`.
struct Binner {
    cuts: Vec<Vec<f64>>,
}

impl Binner {
    fn fit(features: &[FeatureVector], n_bins: usize) -> Self {
        let cuts = (0..FEATURE_COUNT)
            .map(|column| {
                let mut values: Vec<f64> = features.iter().map(|x| x[column]).collect();
                values.sort_by(f64::total_cmp);
                values.dedup();

                let midpoint = |pos: usize| (values[pos - 1] + values[pos]) / 2.0;
                let mut cuts: Vec<f64> = if values.len() <= n_bins {
                    (1..values.len()).map(midpoint).collect()
                } else {
                    (1..n_bins)
                        .map(|k| midpoint((k * values.len() / n_bins).max(1)))
                        .collect()
                };
                cuts.dedup();
                cuts
            })
            .collect();
        Self { cuts }
    }

    fn bin(&self, column: usize, value: f64) -> u16 {
        self.cuts[column].partition_point(|&c| c < value) as u16
    }

    fn transform(&self, features: &[FeatureVector]) -> Vec<[u16; FEATURE_COUNT]> {
        features
            .iter()
            .map(|x| {
                let mut row = [0u16; FEATURE_COUNT];
                for (column, slot) in row.iter_mut().enumerate() {
                    *slot = self.bin(column, x[column]);
                }
                row
            })
            .collect()
    }
}

fn gini(legit: f64, fraud: f64) -> f64 {
    let total = legit + fraud;
    if total <= 0.0 {
        return 0.0;
    }
    let p = fraud / total;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    legit: f64,
    fraud: f64,
    count: usize,
}

impl Tally {
    fn weight(&self) -> f64 {
        self.legit + self.fraud
    }

    fn weighted_impurity(&self) -> f64 {
        gini(self.legit, self.fraud) * self.weight()
    }
}

struct SplitCandidate {
    feature: usize,
    bin: u16,
    gain: f64,
}

struct TreeBuilder<'a> {
    bins: &'a [[u16; FEATURE_COUNT]],
    labels: &'a [u8],
    binner: &'a Binner,
    params: &'a ForestParams,
    max_features: usize,
    rng: StdRng,
    nodes: Vec<Node>,
    importances: [f64; FEATURE_COUNT],
}

impl TreeBuilder<'_> {
    fn tally(&self, samples: &[usize]) -> Tally {
        let mut tally = Tally::default();
        for &s in samples {
            let w = self.params.class_weight.of(self.labels[s]);
            if self.labels[s] == 1 {
                tally.fraud += w;
            } else {
                tally.legit += w;
            }
            tally.count += 1;
        }
        tally
    }

    fn build(&mut self, samples: &mut [usize], depth: usize) -> usize {
        let parent = self.tally(samples);
        let value = if parent.weight() > 0.0 {
            parent.fraud / parent.weight()
        } else {
            0.0
        };
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value });

        if depth >= self.params.max_depth
            || samples.len() < self.params.min_samples_split
            || parent.legit == 0.0
            || parent.fraud == 0.0
        {
            return idx;
        }

        let Some(split) = self.best_split(samples, &parent) else {
            return idx;
        };

        let bins = self.bins;
        let mid = partition_in_place(samples, |s| bins[s][split.feature] <= split.bin);
        self.importances[split.feature] += split.gain;

        let (left_samples, right_samples) = samples.split_at_mut(mid);
        let left = self.build(left_samples, depth + 1);
        let right = self.build(right_samples, depth + 1);

        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: self.binner.cuts[split.feature][split.bin as usize],
            left,
            right,
        };
        idx
    }

    fn best_split(&mut self, samples: &[usize], parent: &Tally) -> Option<SplitCandidate> {
        let min_leaf = self.params.min_samples_leaf;
        let parent_impurity = parent.weighted_impurity();
        let mut best: Option<SplitCandidate> = None;

        let columns = rand::seq::index::sample(&mut self.rng, FEATURE_COUNT, self.max_features);
        for feature in columns.iter() {
            let n_cuts = self.binner.cuts[feature].len();
            if n_cuts == 0 {
                continue;
            }

            let mut hist = vec![Tally::default(); n_cuts + 1];
            for &s in samples {
                let label = self.labels[s];
                let slot = &mut hist[self.bins[s][feature] as usize];
                let w = self.params.class_weight.of(label);
                if label == 1 {
                    slot.fraud += w;
                } else {
                    slot.legit += w;
                }
                slot.count += 1;
            }

            let mut left = Tally::default();
            for (bin, slot) in hist.iter().enumerate().take(n_cuts) {
                left.legit += slot.legit;
                left.fraud += slot.fraud;
                left.count += slot.count;

                let right = Tally {
                    legit: parent.legit - left.legit,
                    fraud: parent.fraud - left.fraud,
                    count: parent.count - left.count,
                };
                if left.count < min_leaf || right.count < min_leaf {
                    continue;
                }

                let gain =
                    parent_impurity - left.weighted_impurity() - right.weighted_impurity();
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        bin: bin as u16,
                        gain,
                    });
                }
            }
        }
        best
    }
}

fn partition_in_place(samples: &mut [usize], goes_left: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..samples.len() {
        if goes_left(samples[i]) {
            samples.swap(i, mid);
            mid += 1;
        }
    }
    mid
}

/// Bagged ensemble of class-weighted CART trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<DecisionTree>,
    feature_importances: [f64; FEATURE_COUNT],
}

impl RandomForest {
    /// Fit a forest on a labelled feature matrix. Labels must be 0 or 1.
    pub fn fit(
        features: &[FeatureVector],
        labels: &[u8],
        params: &ForestParams,
    ) -> Result<Self, FitError> {
        params.check()?;
        if features.is_empty() {
            return Err(FitError::Empty);
        }
        if features.len() != labels.len() {
            return Err(FitError::LengthMismatch {
                features: features.len(),
                labels: labels.len(),
            });
        }
        if let Some((row, &label)) = labels.iter().enumerate().find(|(_, &l)| l > 1) {
            return Err(FitError::InvalidLabel { row, label });
        }
        for (row, x) in features.iter().enumerate() {
            if let Some(column) = x.iter().position(|v| !v.is_finite()) {
                return Err(FitError::NonFinite { row, column });
            }
        }

        let binner = Binner::fit(features, params.n_bins);
        let bins = binner.transform(features);
        let n = features.len();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_trees);
        let mut importances = [0.0; FEATURE_COUNT];

        for _ in 0..params.n_trees {
            let mut tree_rng = StdRng::seed_from_u64(rng.gen());
            let mut samples: Vec<usize> = (0..n).map(|_| tree_rng.gen_range(0..n)).collect();

            let mut builder = TreeBuilder {
                bins: &bins,
                labels,
                binner: &binner,
                params,
                max_features: params.resolved_max_features(),
                rng: tree_rng,
                nodes: Vec::new(),
                importances: [0.0; FEATURE_COUNT],
            };
            builder.build(&mut samples, 0);

            let tree_total: f64 = builder.importances.iter().sum();
            if tree_total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(builder.importances.iter()) {
                    *acc += v / tree_total;
                }
            }
            trees.push(DecisionTree {
                nodes: builder.nodes,
            });
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self {
            params: params.clone(),
            trees,
            feature_importances: importances,
        })
    }

    /// Mean of the per-tree weighted fraud rates.
    pub fn predict_probability(&self, features: &FeatureVector) -> f64 {
        if self.trees.is_empty() {
            return f64::NAN;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        sum / self.trees.len() as f64
    }

    pub fn predict_all(&self, features: &[FeatureVector]) -> Vec<f64> {
        features.iter().map(|x| self.predict_probability(x)).collect()
    }

    /// Normalised mean impurity decrease per feature
    pub fn feature_importances(&self) -> &[f64; FEATURE_COUNT] {
        &self.feature_importances
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Structural check for forests read back from storage.
    pub fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".into());
        }
        self.params.check().map_err(|e| e.to_string())?;
        if self.trees.len() != self.params.n_trees {
            return Err(format!(
                "forest holds {} trees but was fitted with {}",
                self.trees.len(),
                self.params.n_trees
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate().map_err(|e| format!("tree {i}: {e}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(a: f64, b: f64) -> FeatureVector {
        [a, b, 0.0, 0.0, 0.0, 0.0, 0.0]
    }

    /// Fraud iff the first column exceeds 5, second column is noise.
    fn separable() -> (Vec<FeatureVector>, Vec<u8>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..400 {
            let a = (i % 10) as f64;
            let b = ((i * 7) % 13) as f64;
            features.push(row(a, b));
            labels.push(u8::from(a > 5.0));
        }
        (features, labels)
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 15,
            max_depth: 4,
            min_samples_split: 4,
            min_samples_leaf: 2,
            max_features: Some(FEATURE_COUNT),
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_forest_learns_separable_rule() {
        let (features, labels) = separable();
        let forest = RandomForest::fit(&features, &labels, &small_params()).unwrap();

        assert!(forest.predict_probability(&row(9.0, 3.0)) > 0.9);
        assert!(forest.predict_probability(&row(1.0, 3.0)) < 0.1);
        assert!(forest.validate().is_ok());
        assert_eq!(forest.trees().len(), 15);
        assert!(forest.trees().iter().all(|t| t.depth() <= 4));
    }

    #[test]
    fn test_importance_concentrates_on_signal() {
        let (features, labels) = separable();
        let forest = RandomForest::fit(&features, &labels, &small_params()).unwrap();
        let importances = forest.feature_importances();

        assert!(importances[0] > importances[1]);
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_is_reproducible_for_seed() {
        let (features, labels) = separable();
        let a = RandomForest::fit(&features, &labels, &small_params()).unwrap();
        let b = RandomForest::fit(&features, &labels, &small_params()).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_class_weight_raises_fraud_scores() {
        // Overlapping classes: same feature value, 1 in 4 fraud.
        let features: Vec<FeatureVector> = (0..200).map(|_| row(1.0, 1.0)).collect();
        let labels: Vec<u8> = (0..200).map(|i| u8::from(i % 4 == 0)).collect();
        let params = ForestParams {
            n_trees: 1,
            class_weight: ClassWeight {
                legit: 1.0,
                fraud: 3.0,
            },
            ..small_params()
        };

        let forest = RandomForest::fit(&features, &labels, &params).unwrap();
        let p = forest.predict_probability(&row(1.0, 1.0));

        // Unweighted rate is 0.25; weighted rate is 3 * 0.25 / (3 * 0.25 + 0.75) = 0.5
        assert!(p > 0.35, "weighted probability {p}");
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let params = small_params();
        assert!(matches!(
            RandomForest::fit(&[], &[], &params),
            Err(FitError::Empty)
        ));
        assert!(matches!(
            RandomForest::fit(&[row(1.0, 1.0)], &[0, 1], &params),
            Err(FitError::LengthMismatch { .. })
        ));
        assert!(matches!(
            RandomForest::fit(&[row(1.0, 1.0)], &[2], &params),
            Err(FitError::InvalidLabel { row: 0, label: 2 })
        ));
        assert!(matches!(
            RandomForest::fit(&[row(f64::NAN, 1.0)], &[0], &params),
            Err(FitError::NonFinite { row: 0, column: 0 })
        ));
        let zero_trees = ForestParams {
            n_trees: 0,
            ..params
        };
        assert!(matches!(
            RandomForest::fit(&[row(1.0, 1.0)], &[0], &zero_trees),
            Err(FitError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_validate_rejects_dangling_child() {
        let forest = RandomForest {
            params: ForestParams {
                n_trees: 1,
                ..ForestParams::default()
            },
            trees: vec![DecisionTree {
                nodes: vec![Node::Split {
                    feature: 0,
                    threshold: 1.0,
                    left: 1,
                    right: 5,
                }],
            }],
            feature_importances: [0.0; FEATURE_COUNT],
        };

        let err = forest.validate().unwrap_err();
        assert!(err.contains("invalid child"));
    }

    #[test]
    fn test_validate_rejects_tree_count_mismatch() {
        let forest = RandomForest {
            params: ForestParams {
                n_trees: 3,
                ..ForestParams::default()
            },
            trees: vec![DecisionTree {
                nodes: vec![Node::Leaf { value: 0.5 }],
            }],
            feature_importances: [0.0; FEATURE_COUNT],
        };

        let err = forest.validate().unwrap_err();
        assert!(err.contains("3"));
    }
}
