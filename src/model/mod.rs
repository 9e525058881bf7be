pub mod attention;
pub mod column_ctc;
pub mod prediction;

pub use attention::AttentionModel;
pub use column_ctc::ColumnCtcModel;
pub use prediction::PredictionMode;

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::codec::TargetIndices;
use crate::data::raster::ImageBatch;
use crate::error::{TrainError, TrainResult};
use crate::layers::parameter::Parameter;
use crate::math::tensor::Tensor3;

/// A trainable text-line recogniser.
///
/// `forward` returns raw logits `[batch, time, classes]`. In training mode
/// the activations needed by `backward` are cached; in evaluation mode
/// nothing is cached and attention models decode free-running from `[GO]`.
/// `backward` takes ∂L/∂logits for the most recent training forward and
/// adds into every parameter's `grad`.
pub trait RecognitionModel {
    fn prediction_mode(&self) -> PredictionMode;

    fn set_training(&mut self, training: bool);

    fn is_training(&self) -> bool;

    /// `decoder_input` carries the teacher-forcing tokens for attention
    /// models and is ignored by alignment-free ones.
    fn forward(&mut self, images: &ImageBatch, decoder_input: Option<&TargetIndices>) -> TrainResult<Tensor3>;

    fn backward(&mut self, grad_logits: &Tensor3) -> TrainResult<()>;

    fn parameters(&self) -> Vec<&Parameter>;

    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;
}

/// Architecture hyperparameters, stored alongside the run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub mode: PredictionMode,
    /// Every input line must have exactly this many pixel rows.
    pub image_height: usize,
    pub hidden_size: usize,
    #[serde(default)]
    pub activation: ActivationFunction,
    /// Free-running decode length for attention models; defaults to
    /// `batch_max_length + 1` so that `[s]` fits.
    #[serde(default)]
    pub max_decode_steps: Option<usize>,
}

impl ModelConfig {
    pub fn validate(&self) -> TrainResult<()> {
        if self.image_height == 0 || self.hidden_size == 0 {
            return Err(TrainError::InvalidConfig(
                "image_height and hidden_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Builds the model described by `config` with freshly initialised weights.
pub fn build_model<R: Rng + ?Sized>(
    config: &ModelConfig,
    num_classes: usize,
    batch_max_length: usize,
    rng: &mut R,
) -> TrainResult<Box<dyn RecognitionModel>> {
    config.validate()?;
    Ok(match config.mode {
        PredictionMode::SequenceAlignmentFree => Box::new(ColumnCtcModel::new(
            config.image_height,
            config.hidden_size,
            num_classes,
            config.activation,
            rng,
        )),
        PredictionMode::AutoregressiveAttention => Box::new(AttentionModel::new(
            config.image_height,
            config.hidden_size,
            num_classes,
            config.activation,
            config.max_decode_steps.unwrap_or(batch_max_length + 1),
            rng,
        )),
    })
}

/// Copies every parameter value out, in `parameters()` order.
pub fn parameter_values(model: &dyn RecognitionModel) -> Vec<Vec<f64>> {
    model.parameters().iter().map(|p| p.value.data.clone()).collect()
}

/// Overwrites parameter values from a snapshot taken by `parameter_values`.
pub fn load_parameter_values(model: &mut dyn RecognitionModel, values: &[Vec<f64>]) -> TrainResult<()> {
    let mut params = model.parameters_mut();
    if params.len() != values.len() {
        return Err(TrainError::Checkpoint(format!(
            "model has {} parameters, snapshot has {}",
            params.len(),
            values.len()
        )));
    }
    for (i, (param, value)) in params.iter_mut().zip(values).enumerate() {
        if param.numel() != value.len() {
            return Err(TrainError::Checkpoint(format!(
                "parameter {i} holds {} values, snapshot has {}",
                param.numel(),
                value.len()
            )));
        }
        param.value.data.copy_from_slice(value);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod gradcheck {
    use super::*;

    /// Compares analytic parameter gradients with central differences for
    /// the scalar `L = Σ logits ⊙ weights`.
    pub fn check_parameter_gradients(
        model: &mut dyn RecognitionModel,
        images: &ImageBatch,
        decoder_input: Option<&TargetIndices>,
        weights: &Tensor3,
    ) {
        let loss = |model: &mut dyn RecognitionModel| -> f64 {
            let logits = model.forward(images, decoder_input).unwrap();
            logits.data().iter().zip(weights.data()).map(|(a, b)| a * b).sum()
        };

        model.set_training(true);
        model.parameters_mut().iter_mut().for_each(|p| p.zero_grad());
        model.forward(images, decoder_input).unwrap();
        model.backward(weights).unwrap();
        let analytic: Vec<Vec<f64>> = model.parameters().iter().map(|p| p.grad.data.clone()).collect();

        let eps = 1e-5;
        for (pi, grads) in analytic.iter().enumerate() {
            for (i, &g) in grads.iter().enumerate() {
                let orig = model.parameters()[pi].value.data[i];
                model.parameters_mut()[pi].value.data[i] = orig + eps;
                let up = loss(model);
                model.parameters_mut()[pi].value.data[i] = orig - eps;
                let down = loss(model);
                model.parameters_mut()[pi].value.data[i] = orig;
                let numeric = (up - down) / (2.0 * eps);
                assert!(
                    (numeric - g).abs() <= 1e-5 * (1.0 + numeric.abs()),
                    "param {pi}[{i}]: numeric {numeric} vs analytic {g}"
                );
            }
        }
    }
}
