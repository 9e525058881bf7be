pub mod attention;
pub mod charset;
pub mod ctc;

pub use attention::AttnCodec;
pub use charset::Charset;
pub use ctc::CtcCodec;

use crate::error::{TrainError, TrainResult};
use crate::math::tensor::Tensor3;

/// Integer class indices, row-major `[rows, cols]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetIndices {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<usize>,
}

impl TargetIndices {
    pub fn new(rows: usize, cols: usize, data: Vec<usize>) -> TrainResult<TargetIndices> {
        if data.len() != rows * cols {
            return Err(TrainError::shape(format!(
                "target indices [{rows}, {cols}] need {} values, got {}",
                rows * cols,
                data.len()
            )));
        }
        Ok(TargetIndices { rows, cols, data })
    }

    pub fn row(&self, r: usize) -> &[usize] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Columns `[from, to)` of every row.
    pub fn slice_cols(&self, from: usize, to: usize) -> TargetIndices {
        let to = to.min(self.cols);
        let from = from.min(to);
        let cols = to - from;
        let mut data = Vec::with_capacity(self.rows * cols);
        for r in 0..self.rows {
            data.extend_from_slice(&self.row(r)[from..to]);
        }
        TargetIndices { rows: self.rows, cols, data }
    }

    /// `targets[:, :-1]`, the teacher-forcing decoder input.
    pub fn without_last_column(&self) -> TargetIndices {
        self.slice_cols(0, self.cols.saturating_sub(1))
    }

    /// `targets[:, 1:]`, the tokens each decoder step must predict.
    pub fn without_first_column(&self) -> TargetIndices {
        self.slice_cols(1, self.cols)
    }
}

/// Encoded labels: padded index rows plus the meaningful length of each row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTargets {
    pub targets: TargetIndices,
    pub lengths: Vec<usize>,
}

impl EncodedTargets {
    /// # Errors
    /// `ShapeMismatch` unless there is one length per row and every length
    /// fits in the row.
    pub fn new(targets: TargetIndices, lengths: Vec<usize>) -> TrainResult<EncodedTargets> {
        if lengths.len() != targets.rows {
            return Err(TrainError::shape(format!(
                "{} target rows but {} lengths",
                targets.rows,
                lengths.len()
            )));
        }
        if let Some(&too_long) = lengths.iter().find(|&&l| l > targets.cols) {
            return Err(TrainError::shape(format!(
                "target length {too_long} exceeds padded width {}",
                targets.cols
            )));
        }
        Ok(EncodedTargets { targets, lengths })
    }
}

/// One decoded prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub text: String,
    pub confidence: f64,
}

/// Converts between label strings and class indices.
///
/// Implementations are pure: the same input always yields the same output,
/// and `decode` returns one entry per batch row, in batch order.
pub trait LabelCodec {
    /// Size of the class dimension the model must emit.
    fn num_classes(&self) -> usize;

    fn encode(&self, labels: &[String], max_length: usize) -> TrainResult<EncodedTargets>;

    /// `probabilities` is `[batch, time, classes]` after softmax.
    fn decode(&self, probabilities: &Tensor3) -> Vec<Decoded>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_slices_shift_targets() {
        let t = TargetIndices::new(2, 3, vec![0, 5, 1, 0, 6, 1]).unwrap();
        assert_eq!(t.without_last_column().data, vec![0, 5, 0, 6]);
        assert_eq!(t.without_first_column().data, vec![5, 1, 6, 1]);
    }

    #[test]
    fn lengths_must_fit_rows() {
        let t = TargetIndices::new(1, 2, vec![3, 4]).unwrap();
        assert!(EncodedTargets::new(t.clone(), vec![3]).is_err());
        assert!(EncodedTargets::new(t.clone(), vec![1, 1]).is_err());
        assert!(EncodedTargets::new(t, vec![2]).is_ok());
    }
}
