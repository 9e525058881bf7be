use serde::{Serialize, Deserialize};

use crate::error::{TrainError, TrainResult};

/// Summary of one training pass, returned by `train_epoch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochResult {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Loss summed over the consumed batches, divided by the declared batch
    /// count.
    pub train_loss: f64,
    /// Exact matches over the whole training set, in `[0, 1]`.
    pub train_acc: f64,
    /// Learning rate sampled at the last batch.
    pub lr: f64,
    /// Wall-clock seconds.
    pub time: f64,
}

/// Un-normalised validation counters from `evaluate`.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct EvalTotals {
    pub n_correct: usize,
    pub edit_distance: f64,
    /// Samples actually scored.
    pub samples: usize,
}

/// Validation accuracy and mean edit distance for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub val_acc: f64,
    pub edit_distance: f64,
}

impl ValidationSummary {
    /// Normalises `totals` by `dataset_size`.
    ///
    /// # Errors
    /// `EmptyDataset` when `dataset_size` is zero.
    pub fn from_totals(totals: &EvalTotals, dataset_size: usize) -> TrainResult<ValidationSummary> {
        if dataset_size == 0 {
            return Err(TrainError::EmptyDataset(
                "validation set has no samples to normalise accuracy by".into(),
            ));
        }
        let n = dataset_size as f64;
        Ok(ValidationSummary {
            val_acc: totals.n_correct as f64 / n,
            edit_distance: totals.edit_distance / n,
        })
    }
}
