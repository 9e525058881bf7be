use crate::codec::TargetIndices;
use crate::error::{TrainError, TrainResult};
use crate::math::tensor::{log_add_exp, Tensor3};

/// Connectionist temporal classification loss.
///
/// Input is time-major log-probabilities `[T, B, C]` (log-softmax already
/// applied). The loss marginalises over every alignment of the label onto the
/// `T` output steps, computed with the forward-backward recursions in log
/// space. Reduction is the mean over the batch of each sample's negative
/// log-likelihood divided by its target length.
#[derive(Debug, Clone, Copy)]
pub struct CtcLoss {
    pub blank: usize,
    /// Infeasible samples (label cannot fit in the output length) contribute
    /// zero loss and zero gradient instead of `+inf`.
    pub zero_infinity: bool,
}

impl Default for CtcLoss {
    fn default() -> Self {
        CtcLoss { blank: 0, zero_infinity: false }
    }
}

/// Loss value plus ∂loss/∂logits, time-major like the input.
///
/// The gradient is taken w.r.t. the logits that fed the log-softmax, using
/// the combined form `softmax - posterior`, the same simplification
/// Softmax + cross-entropy enjoys.
#[derive(Debug, Clone)]
pub struct CtcOutput {
    pub loss: f64,
    pub grad: Tensor3,
}

impl CtcLoss {
    pub fn compute(
        &self,
        log_probs: &Tensor3,
        targets: &TargetIndices,
        input_lengths: &[usize],
        target_lengths: &[usize],
    ) -> TrainResult<CtcOutput> {
        let [time, batch, classes] = log_probs.dims();
        if targets.rows != batch || input_lengths.len() != batch || target_lengths.len() != batch {
            return Err(TrainError::shape(format!(
                "ctc: batch {batch}, target rows {}, {} input lengths, {} target lengths",
                targets.rows,
                input_lengths.len(),
                target_lengths.len()
            )));
        }
        if batch == 0 {
            return Err(TrainError::shape("ctc: empty batch"));
        }

        let mut grad = Tensor3::zeros(time, batch, classes);
        let mut total = 0.0;

        for b in 0..batch {
            let t_len = input_lengths[b];
            let l_len = target_lengths[b];
            if t_len == 0 || t_len > time {
                return Err(TrainError::shape(format!(
                    "ctc: input length {t_len} outside 1..={time}"
                )));
            }
            if l_len > targets.cols {
                return Err(TrainError::shape(format!(
                    "ctc: target length {l_len} exceeds {} columns",
                    targets.cols
                )));
            }
            let label = &targets.row(b)[..l_len];
            if let Some(&bad) = label.iter().find(|&&k| k >= classes || k == self.blank) {
                return Err(TrainError::shape(format!(
                    "ctc: target class {bad} invalid for {classes} classes with blank {}",
                    self.blank
                )));
            }

            let scale = 1.0 / (batch as f64 * l_len.max(1) as f64);
            let lp = |t: usize, k: usize| log_probs.at(t, b, k);
            let nll = self.sample(lp, t_len, classes, label, |t, k, g| {
                grad.lane_mut(t, b)[k] = g * scale;
            });

            match nll {
                Some(nll) => total += nll / l_len.max(1) as f64,
                None if self.zero_infinity => {
                    for t in 0..t_len {
                        grad.lane_mut(t, b).fill(0.0);
                    }
                }
                None => total = f64::INFINITY,
            }
        }

        Ok(CtcOutput { loss: total / batch as f64, grad })
    }

    /// Negative log-likelihood of one sample, `None` when no alignment
    /// exists. On success calls `emit(t, k, ∂nll/∂logit[t, k])` for every
    /// step inside the input length.
    fn sample<L, E>(&self, lp: L, t_len: usize, classes: usize, label: &[usize], mut emit: E) -> Option<f64>
    where
        L: Fn(usize, usize) -> f64,
        E: FnMut(usize, usize, f64),
    {
        // Extended label: blank, l1, blank, l2, ..., blank
        let mut ext = Vec::with_capacity(2 * label.len() + 1);
        ext.push(self.blank);
        for &k in label {
            ext.push(k);
            ext.push(self.blank);
        }
        let s_len = ext.len();
        let neg_inf = f64::NEG_INFINITY;
        let can_skip = |s: usize| s >= 2 && ext[s] != self.blank && ext[s] != ext[s - 2];

        let mut alpha = vec![neg_inf; t_len * s_len];
        alpha[0] = lp(0, ext[0]);
        if s_len > 1 {
            alpha[1] = lp(0, ext[1]);
        }
        for t in 1..t_len {
            let (prev, cur) = alpha.split_at_mut(t * s_len);
            let prev = &prev[(t - 1) * s_len..];
            for s in 0..s_len {
                let mut acc = prev[s];
                if s >= 1 {
                    acc = log_add_exp(acc, prev[s - 1]);
                }
                if can_skip(s) {
                    acc = log_add_exp(acc, prev[s - 2]);
                }
                cur[s] = acc + lp(t, ext[s]);
            }
        }

        let last = (t_len - 1) * s_len;
        let log_likelihood = if s_len > 1 {
            log_add_exp(alpha[last + s_len - 1], alpha[last + s_len - 2])
        } else {
            alpha[last]
        };
        if !log_likelihood.is_finite() {
            return None;
        }

        let mut beta = vec![neg_inf; t_len * s_len];
        beta[last + s_len - 1] = lp(t_len - 1, ext[s_len - 1]);
        if s_len > 1 {
            beta[last + s_len - 2] = lp(t_len - 1, ext[s_len - 2]);
        }
        for t in (0..t_len - 1).rev() {
            let (cur, next) = beta.split_at_mut((t + 1) * s_len);
            let cur = &mut cur[t * s_len..];
            for s in 0..s_len {
                let mut acc = next[s];
                if s + 1 < s_len {
                    acc = log_add_exp(acc, next[s + 1]);
                }
                if s + 2 < s_len && can_skip(s + 2) {
                    acc = log_add_exp(acc, next[s + 2]);
                }
                cur[s] = acc + lp(t, ext[s]);
            }
        }

        // α_t(s)·β_t(s) counts y_t(l'_s) twice; divide it out once.
        let mut occupancy = vec![neg_inf; classes];
        for t in 0..t_len {
            occupancy.fill(neg_inf);
            for s in 0..s_len {
                let k = ext[s];
                occupancy[k] = log_add_exp(occupancy[k], alpha[t * s_len + s] + beta[t * s_len + s]);
            }
            for (k, &occ) in occupancy.iter().enumerate() {
                let lp_tk = lp(t, k);
                let posterior = if occ == neg_inf { 0.0 } else { (occ - lp_tk - log_likelihood).exp() };
                emit(t, k, lp_tk.exp() - posterior);
            }
        }

        Some(-log_likelihood)
    }
}
