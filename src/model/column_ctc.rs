use rand::Rng;

use crate::activation::activation::ActivationFunction;
use crate::codec::TargetIndices;
use crate::data::raster::ImageBatch;
use crate::error::{TrainError, TrainResult};
use crate::layers::linear::Linear;
use crate::layers::parameter::Parameter;
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor3;
use crate::model::{PredictionMode, RecognitionModel};

/// Alignment-free recogniser: every pixel column is one time step.
///
/// column (height) → Linear → activation → Linear → class logits
pub struct ColumnCtcModel {
    encoder: Linear,
    activation: ActivationFunction,
    head: Linear,
    training: bool,
    pre_activation: Option<Matrix>,
}

impl ColumnCtcModel {
    pub fn new<R: Rng + ?Sized>(
        image_height: usize,
        hidden_size: usize,
        num_classes: usize,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> ColumnCtcModel {
        ColumnCtcModel {
            encoder: Linear::new(image_height, hidden_size, rng),
            activation,
            head: Linear::new(hidden_size, num_classes, rng),
            training: true,
            pre_activation: None,
        }
    }
}

impl RecognitionModel for ColumnCtcModel {
    fn prediction_mode(&self) -> PredictionMode {
        PredictionMode::SequenceAlignmentFree
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn forward(&mut self, images: &ImageBatch, _decoder_input: Option<&TargetIndices>) -> TrainResult<Tensor3> {
        if images.height != self.encoder.input_size() {
            return Err(TrainError::shape(format!(
                "model expects {}-pixel-high lines, got {}",
                self.encoder.input_size(),
                images.height
            )));
        }
        let pre = self.encoder.forward(&images.columns(), self.training)?;
        let hidden = self.activation.apply(&pre);
        let logits = self.head.forward(&hidden, self.training)?;
        self.pre_activation = if self.training { Some(pre) } else { None };
        Tensor3::from_matrix(images.batch, images.width, logits)
    }

    fn backward(&mut self, grad_logits: &Tensor3) -> TrainResult<()> {
        let pre = self.pre_activation.take().ok_or_else(|| {
            TrainError::InvalidState("backward called without a training forward pass".into())
        })?;
        let grad_hidden = self.head.backward(&grad_logits.to_matrix())?;
        let grad_pre = self.activation.backprop(&pre, &grad_hidden);
        self.encoder.backward(&grad_pre)?;
        Ok(())
    }

    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.encoder.parameters();
        params.extend(self.head.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = self.encoder.parameters_mut();
        params.extend(self.head.parameters_mut());
        params
    }
}
