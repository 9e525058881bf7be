use crate::error::{TrainError, TrainResult};
use crate::math::matrix::Matrix;

/// Rank-3 row-major tensor, `[d0, d1, d2]`.
///
/// Model outputs are `[batch, time, classes]`; the CTC loss consumes the
/// time-major view `[time, batch, classes]` produced by `swap_leading`.
/// The innermost dimension is always the class dimension, so every
/// normalisation below works on contiguous "lanes" of length `d2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3 {
    dims: [usize; 3],
    data: Vec<f64>,
}

impl Tensor3 {
    pub fn zeros(d0: usize, d1: usize, d2: usize) -> Tensor3 {
        Tensor3 { dims: [d0, d1, d2], data: vec![0.0; d0 * d1 * d2] }
    }

    pub fn from_vec(d0: usize, d1: usize, d2: usize, data: Vec<f64>) -> TrainResult<Tensor3> {
        if data.len() != d0 * d1 * d2 {
            return Err(TrainError::shape(format!(
                "tensor [{d0}, {d1}, {d2}] needs {} values, got {}",
                d0 * d1 * d2,
                data.len()
            )));
        }
        Ok(Tensor3 { dims: [d0, d1, d2], data })
    }

    /// Reshapes a `[d0 * d1, d2]` matrix into `[d0, d1, d2]`.
    pub fn from_matrix(d0: usize, d1: usize, matrix: Matrix) -> TrainResult<Tensor3> {
        if matrix.rows != d0 * d1 {
            return Err(TrainError::shape(format!(
                "cannot view {} rows as [{d0}, {d1}]",
                matrix.rows
            )));
        }
        Tensor3::from_vec(d0, d1, matrix.cols, matrix.data)
    }

    /// Flattens the two leading dimensions: `[d0, d1, d2] -> [d0 * d1, d2]`.
    pub fn to_matrix(&self) -> Matrix {
        Matrix {
            rows: self.dims[0] * self.dims[1],
            cols: self.dims[2],
            data: self.data.clone(),
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    fn offset(&self, i: usize, j: usize) -> usize {
        (i * self.dims[1] + j) * self.dims[2]
    }

    /// The innermost vector at `[i, j, ..]`.
    pub fn lane(&self, i: usize, j: usize) -> &[f64] {
        let start = self.offset(i, j);
        &self.data[start..start + self.dims[2]]
    }

    pub fn lane_mut(&mut self, i: usize, j: usize) -> &mut [f64] {
        let start = self.offset(i, j);
        let len = self.dims[2];
        &mut self.data[start..start + len]
    }

    pub fn at(&self, i: usize, j: usize, k: usize) -> f64 {
        self.data[self.offset(i, j) + k]
    }

    /// `[a, b, c] -> [b, a, c]`, materialised.
    pub fn swap_leading(&self) -> Tensor3 {
        let [a, b, c] = self.dims;
        let mut out = Tensor3::zeros(b, a, c);
        for i in 0..a {
            for j in 0..b {
                out.lane_mut(j, i).copy_from_slice(self.lane(i, j));
            }
        }
        out
    }

    pub fn log_softmax(&self) -> Tensor3 {
        self.map_lanes(log_softmax_in_place)
    }

    pub fn softmax(&self) -> Tensor3 {
        self.map_lanes(softmax_in_place)
    }

    fn map_lanes(&self, f: fn(&mut [f64])) -> Tensor3 {
        let mut out = self.clone();
        if self.dims[2] > 0 {
            out.data.chunks_mut(self.dims[2]).for_each(f);
        }
        out
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }
}

/// `ln(e^a + e^b)` that tolerates `-inf` on either side.
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let m = a.max(b);
    m + ((a - m).exp() + (b - m).exp()).ln()
}

pub fn log_softmax_in_place(lane: &mut [f64]) {
    let max = lane.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let log_z = max + lane.iter().map(|x| (x - max).exp()).sum::<f64>().ln();
    lane.iter_mut().for_each(|x| *x -= log_z);
}

pub fn softmax_in_place(lane: &mut [f64]) {
    let max = lane.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for x in lane.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }
    lane.iter_mut().for_each(|x| *x /= sum);
}

/// Index and value of the maximum element; ties resolve to the lowest index.
pub fn argmax(v: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, &x) in v.iter().enumerate() {
        if x > best.1 {
            best = (i, x);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_softmax_lanes_normalise() {
        let t = Tensor3::from_vec(1, 2, 3, vec![1.0, 2.0, 3.0, -5.0, 0.0, 5.0]).unwrap();
        let lp = t.log_softmax();
        for j in 0..2 {
            let total: f64 = lp.lane(0, j).iter().map(|x| x.exp()).sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
        let p = t.softmax();
        assert!((p.at(0, 0, 2) - lp.at(0, 0, 2).exp()).abs() < 1e-12);
    }

    #[test]
    fn swap_leading_moves_lanes() {
        let t = Tensor3::from_vec(2, 3, 1, (0..6).map(f64::from).collect()).unwrap();
        let s = t.swap_leading();
        assert_eq!(s.dims(), [3, 2, 1]);
        assert_eq!(s.at(2, 1, 0), t.at(1, 2, 0));
        assert_eq!(s.swap_leading(), t);
    }

    #[test]
    fn log_add_exp_handles_neg_infinity() {
        assert_eq!(log_add_exp(f64::NEG_INFINITY, 1.5), 1.5);
        assert!((log_add_exp(0.0, 0.0) - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7]).0, 1);
    }
}
