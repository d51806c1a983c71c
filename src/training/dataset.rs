//! Labelled transactions and stratified partitioning

use crate::error::TrainingError;
use crate::types::transaction::TransactionRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Raw labelled transactions; label 1 marks fraud.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<TransactionRecord>,
    pub labels: Vec<u8>,
}

impl Dataset {
    pub fn new(records: Vec<TransactionRecord>, labels: Vec<u8>) -> Result<Self, TrainingError> {
        if records.len() != labels.len() {
            return Err(TrainingError::LengthMismatch {
                records: records.len(),
                labels: labels.len(),
            });
        }
        Ok(Self { records, labels })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    pub fn fraud_rate(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.positives() as f64 / self.len() as f64
        }
    }

    fn subset(&self, indices: &[usize]) -> Self {
        Self {
            records: indices.iter().map(|&i| self.records[i]).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

/// Proportions for the train / validation / test partition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub validation: f64,
}

impl SplitRatios {
    pub fn test(&self) -> f64 {
        1.0 - self.train - self.validation
    }

    pub(crate) fn check(&self) -> Result<(), TrainingError> {
        let ok = self.train > 0.0 && self.validation > 0.0 && self.test() > 0.0;
        if ok {
            Ok(())
        } else {
            Err(TrainingError::InvalidConfig(format!(
                "split ratios {}/{}/{} must all be positive",
                self.train,
                self.validation,
                self.test()
            )))
        }
    }
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.6,
            validation: 0.2,
        }
    }
}

/// Three disjoint partitions of one dataset
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: Dataset,
    pub validation: Dataset,
    pub test: Dataset,
}

/// Partition by label so every split keeps the overall class ratio.
///
/// Deterministic for a given seed.
pub fn stratified_split(
    dataset: &Dataset,
    ratios: SplitRatios,
    seed: u64,
) -> Result<DatasetSplit, TrainingError> {
    ratios.check()?;
    if dataset.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut validation = Vec::new();
    let mut test = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = (0..dataset.len())
            .filter(|&i| dataset.labels[i] == class)
            .collect();
        members.shuffle(&mut rng);

        let n = members.len();
        let n_train = (((n as f64) * ratios.train).round() as usize).min(n);
        let n_validation = (((n as f64) * ratios.validation).round() as usize).min(n - n_train);

        train.extend_from_slice(&members[..n_train]);
        validation.extend_from_slice(&members[n_train..n_train + n_validation]);
        test.extend_from_slice(&members[n_train + n_validation..]);
    }

    for part in [&mut train, &mut validation, &mut test] {
        part.shuffle(&mut rng);
    }

    Ok(DatasetSplit {
        train: dataset.subset(&train),
        validation: dataset.subset(&validation),
        test: dataset.subset(&test),
    })
}
