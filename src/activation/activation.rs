use serde::{Serialize, Deserialize};

use crate::math::matrix::Matrix;

/// Element-wise hidden-layer activation.
///
/// Output distributions are never produced here: models emit raw logits and
/// the loss strategy applies the (log-)softmax over the class dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFunction {
    Identity,
    ReLU,
    Tanh,
    Sigmoid,
    LeakyReLU { alpha: f64 },
}

impl Default for ActivationFunction {
    fn default() -> Self {
        ActivationFunction::Tanh
    }
}

impl ActivationFunction {
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Identity => x,
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
        }
    }

    /// Derivative evaluated at the pre-activation `x` (not at the output).
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Identity => 1.0,
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            }
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { 1.0 } else { *alpha },
        }
    }

    pub fn apply(&self, pre: &Matrix) -> Matrix {
        pre.map(|x| self.function(x))
    }

    /// δ = upstream ⊙ σ'(z), with `pre` holding z.
    pub fn backprop(&self, pre: &Matrix, upstream: &Matrix) -> Matrix {
        upstream.hadamard(&pre.map(|x| self.derivative(x)))
    }
}
