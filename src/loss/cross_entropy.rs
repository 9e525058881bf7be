use crate::error::{TrainError, TrainResult};
use crate::math::tensor::{log_softmax_in_place, Tensor3};

/// Token-wise categorical cross-entropy over raw logits.
///
/// Every `[.., .., classes]` lane of the logits is one prediction; `targets`
/// holds one class index per lane in the same row-major order. Lanes whose
/// target equals `ignore_index` are excluded from both the mean and the
/// gradient.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss {
    pub ignore_index: Option<usize>,
}

impl CrossEntropyLoss {
    pub fn with_ignore_index(index: usize) -> Self {
        CrossEntropyLoss { ignore_index: Some(index) }
    }

    /// Computes the mean loss and its gradient w.r.t. the logits.
    ///
    /// Softmax and cross-entropy are differentiated together, so the
    /// gradient is simply `(softmax - one_hot) / counted`, the same combined
    /// form the CTC loss uses.
    pub fn compute(&self, logits: &Tensor3, targets: &[usize]) -> TrainResult<(f64, Tensor3)> {
        let [d0, d1, classes] = logits.dims();
        if targets.len() != d0 * d1 {
            return Err(TrainError::shape(format!(
                "cross-entropy: {} predictions but {} targets",
                d0 * d1,
                targets.len()
            )));
        }
        if let Some(&bad) = targets.iter().find(|&&t| t >= classes && Some(t) != self.ignore_index) {
            return Err(TrainError::shape(format!(
                "cross-entropy: target {bad} outside {classes} classes"
            )));
        }

        let counted = targets.iter().filter(|&&t| Some(t) != self.ignore_index).count();
        if counted == 0 {
            return Err(TrainError::shape("cross-entropy: every target is ignored"));
        }
        let inv = 1.0 / counted as f64;

        let mut grad = logits.clone();
        let mut total = 0.0;
        for (lane, &target) in grad.data_mut().chunks_mut(classes).zip(targets) {
            if Some(target) == self.ignore_index {
                lane.fill(0.0);
                continue;
            }
            log_softmax_in_place(lane);
            total -= lane[target];
            for (k, g) in lane.iter_mut().enumerate() {
                let p = g.exp();
                *g = (p - if k == target { 1.0 } else { 0.0 }) * inv;
            }
        }

        Ok((total * inv, grad))
    }
}
