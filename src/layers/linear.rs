use rand::Rng;

use crate::error::{TrainError, TrainResult};
use crate::layers::parameter::Parameter;
use crate::math::matrix::Matrix;

/// Fully connected layer, `y = x·W + b`.
///
/// `weights` is `[input_size, output_size]`, `biases` is `[1, output_size]`.
/// Each input row is one sample; a whole batch (or every time step of every
/// sample) goes through in one call.
#[derive(Debug, Clone)]
pub struct Linear {
    pub weights: Parameter,
    pub biases: Parameter,
    input: Option<Matrix>,  // forward input kept for the weight gradient
}

impl Linear {
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Linear {
        Linear {
            weights: Parameter::new(Matrix::xavier(input_size, output_size, rng)),
            biases: Parameter::new(Matrix::zeros(1, output_size)),
            input: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.value.rows
    }

    pub fn output_size(&self) -> usize {
        self.weights.value.cols
    }

    /// Forward pass. With `cache = false` nothing is retained, so a following
    /// `backward` fails; evaluation runs this way.
    pub fn forward(&mut self, input: &Matrix, cache: bool) -> TrainResult<Matrix> {
        if input.cols != self.input_size() {
            return Err(TrainError::shape(format!(
                "linear layer expects {} features, got {}",
                self.input_size(),
                input.cols
            )));
        }
        let mut z = input * &self.weights.value;
        z.add_row_vector(&self.biases.value.data);
        self.input = if cache { Some(input.clone()) } else { None };
        Ok(z)
    }

    /// Accumulates parameter gradients from `grad_output` (∂L/∂y) and
    /// returns ∂L/∂x.
    pub fn backward(&mut self, grad_output: &Matrix) -> TrainResult<Matrix> {
        let input = self.input.as_ref().ok_or_else(|| {
            TrainError::InvalidState("linear backward without a cached forward pass".into())
        })?;
        if grad_output.rows != input.rows || grad_output.cols != self.output_size() {
            return Err(TrainError::shape(format!(
                "linear backward expects [{}, {}], got [{}, {}]",
                input.rows,
                self.output_size(),
                grad_output.rows,
                grad_output.cols
            )));
        }

        self.weights.grad += &(&input.transpose() * grad_output);
        let bias_grad = grad_output.sum_rows();
        for (g, b) in self.biases.grad.data.iter_mut().zip(bias_grad) {
            *g += b;
        }

        Ok(grad_output * &self.weights.value.transpose())
    }

    pub fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.weights, &self.biases]
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weights, &mut self.biases]
    }
}
