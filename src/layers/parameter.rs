use crate::math::matrix::Matrix;

/// A trainable tensor together with its accumulated gradient.
///
/// `grad` always has the shape of `value`. Backward passes add into it;
/// `Optimizer::zero_grad` clears it.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub value: Matrix,
    pub grad: Matrix,
}

impl Parameter {
    pub fn new(value: Matrix) -> Parameter {
        let grad = Matrix::zeros(value.rows, value.cols);
        Parameter { value, grad }
    }

    pub fn numel(&self) -> usize {
        self.value.data.len()
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    pub fn grad_sq_norm(&self) -> f64 {
        self.grad.data.iter().map(|g| g * g).sum()
    }
}
