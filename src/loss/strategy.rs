use crate::codec::attention::GO;
use crate::codec::ctc::BLANK;
use crate::codec::EncodedTargets;
use crate::data::raster::ImageBatch;
use crate::error::{TrainError, TrainResult};
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::loss::ctc::CtcLoss;
use crate::math::tensor::Tensor3;
use crate::model::{PredictionMode, RecognitionModel};

/// The loss paired with each `PredictionMode`.
///
/// One variant per mode; a new mode means a new variant here and in
/// `PredictionMode`, and the compiler points at every match to update.
#[derive(Debug, Clone, Copy)]
pub enum LossStrategy {
    AlignmentFree(CtcLoss),
    Attention(CrossEntropyLoss),
}

/// Result of one loss evaluation.
///
/// `logits` is the model output `[batch, time, classes]` the accuracy scorer
/// decodes; `grad` is ∂loss/∂logits in the same layout, ready for
/// `RecognitionModel::backward`.
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub loss: f64,
    pub logits: Tensor3,
    pub grad: Tensor3,
}

impl LossStrategy {
    pub fn for_mode(mode: PredictionMode) -> LossStrategy {
        match mode {
            PredictionMode::SequenceAlignmentFree => {
                LossStrategy::AlignmentFree(CtcLoss { blank: BLANK, zero_infinity: false })
            }
            PredictionMode::AutoregressiveAttention => {
                LossStrategy::Attention(CrossEntropyLoss::with_ignore_index(GO))
            }
        }
    }

    /// Sets CTC `zero_infinity`: infeasible samples add zero loss instead of
    /// `+inf`. No effect on the attention loss.
    pub fn with_zero_infinity(self, zero_infinity: bool) -> LossStrategy {
        match self {
            LossStrategy::AlignmentFree(ctc) => LossStrategy::AlignmentFree(CtcLoss { zero_infinity, ..ctc }),
            other => other,
        }
    }

    pub fn mode(&self) -> PredictionMode {
        match self {
            LossStrategy::AlignmentFree(_) => PredictionMode::SequenceAlignmentFree,
            LossStrategy::Attention(_) => PredictionMode::AutoregressiveAttention,
        }
    }

    /// Fails with `UnsupportedMode` when a model of `mode` cannot be trained
    /// with this strategy.
    pub fn ensure_supports(&self, mode: PredictionMode) -> TrainResult<()> {
        if self.mode() != mode {
            return Err(TrainError::UnsupportedMode(format!(
                "{mode} model cannot be trained with the {} loss",
                self.mode()
            )));
        }
        Ok(())
    }

    /// Runs the forward pass and the loss for one batch.
    ///
    /// The mode check happens before the model is touched.
    pub fn forward(
        &self,
        model: &mut dyn RecognitionModel,
        images: &ImageBatch,
        encoded: &EncodedTargets,
    ) -> TrainResult<LossOutput> {
        self.ensure_supports(model.prediction_mode())?;

        match self {
            LossStrategy::AlignmentFree(ctc) => {
                let logits = model.forward(images, None)?;
                let [batch, time, _] = logits.dims();
                if batch != encoded.lengths.len() {
                    return Err(TrainError::shape(format!(
                        "model returned {batch} rows for {} labels",
                        encoded.lengths.len()
                    )));
                }
                // CTC wants [time, batch, classes].
                let log_probs = logits.log_softmax().swap_leading();
                let output_lengths = vec![time; batch];
                let out = ctc.compute(&log_probs, &encoded.targets, &output_lengths, &encoded.lengths)?;
                Ok(LossOutput { loss: out.loss, grad: out.grad.swap_leading(), logits })
            }
            LossStrategy::Attention(ce) => {
                // Teacher forcing: feed [GO] c1 .. cn, predict c1 .. cn [s].
                let decoder_input = encoded.targets.without_last_column();
                let logits = model.forward(images, Some(&decoder_input))?;
                let expected = encoded.targets.without_first_column();
                let [batch, steps, _] = logits.dims();
                if batch != expected.rows || steps != expected.cols {
                    return Err(TrainError::shape(format!(
                        "decoder produced [{batch}, {steps}] steps for targets [{}, {}]",
                        expected.rows, expected.cols
                    )));
                }
                let (loss, grad) = ce.compute(&logits, &expected.data)?;
                Ok(LossOutput { loss, logits, grad })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use crate::codec::{AttnCodec, Charset, CtcCodec, LabelCodec, TargetIndices};
    use crate::data::raster::LineImage;
    use crate::layers::parameter::Parameter;
    use crate::model::{AttentionModel, ColumnCtcModel};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Records whether it was ever run.
    struct Untouchable {
        forwards: usize,
    }

    impl RecognitionModel for Untouchable {
        fn prediction_mode(&self) -> PredictionMode {
            PredictionMode::AutoregressiveAttention
        }
        fn set_training(&mut self, _training: bool) {}
        fn is_training(&self) -> bool {
            true
        }
        fn forward(&mut self, _images: &ImageBatch, _d: Option<&TargetIndices>) -> TrainResult<Tensor3> {
            self.forwards += 1;
            Ok(Tensor3::zeros(1, 1, 1))
        }
        fn backward(&mut self, _grad: &Tensor3) -> TrainResult<()> {
            Ok(())
        }
        fn parameters(&self) -> Vec<&Parameter> {
            Vec::new()
        }
        fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
            Vec::new()
        }
    }

    fn one_line(width: usize) -> ImageBatch {
        ImageBatch::stack(&[&LineImage::new(3, width, vec![0.5; 3 * width]).unwrap()]).unwrap()
    }

    #[test]
    fn mismatched_mode_fails_before_forward() {
        let mut model = Untouchable { forwards: 0 };
        let strategy = LossStrategy::for_mode(PredictionMode::SequenceAlignmentFree);
        let encoded = CtcCodec::new(Charset::new("ab").unwrap())
            .encode(&["a".to_string()], 4)
            .unwrap();
        let err = strategy.forward(&mut model, &one_line(4), &encoded).unwrap_err();
        assert!(matches!(err, TrainError::UnsupportedMode(_)));
        assert_eq!(model.forwards, 0);
    }

    #[test]
    fn ctc_branch_returns_batch_major_gradient() {
        let mut rng = StdRng::seed_from_u64(4);
        let codec = CtcCodec::new(Charset::new("ab").unwrap());
        let mut model = ColumnCtcModel::new(3, 4, codec.num_classes(), ActivationFunction::Tanh, &mut rng);
        let encoded = codec.encode(&["ab".to_string()], 4).unwrap();
        let out = LossStrategy::for_mode(PredictionMode::SequenceAlignmentFree)
            .forward(&mut model, &one_line(5), &encoded)
            .unwrap();
        assert!(out.loss.is_finite() && out.loss > 0.0);
        assert_eq!(out.logits.dims(), [1, 5, 3]);
        assert_eq!(out.grad.dims(), out.logits.dims());
    }

    #[test]
    fn attention_branch_shifts_targets() {
        let mut rng = StdRng::seed_from_u64(4);
        let codec = AttnCodec::new(Charset::new("ab").unwrap());
        let mut model = AttentionModel::new(3, 4, codec.num_classes(), ActivationFunction::Tanh, 5, &mut rng);
        let encoded = codec.encode(&["ba".to_string()], 3).unwrap();
        let out = LossStrategy::for_mode(PredictionMode::AutoregressiveAttention)
            .forward(&mut model, &one_line(4), &encoded)
            .unwrap();
        // max_length 3 -> 5 columns -> 4 decoder steps
        assert_eq!(out.logits.dims(), [1, 4, 4]);
        assert!(out.loss.is_finite());
        // steps past [s] are padding and carry no gradient
        assert!(out.grad.lane(0, 3).iter().all(|&g| g == 0.0));
    }

    #[test]
    fn zero_infinity_turns_an_infeasible_label_into_zero_loss() {
        let mut rng = StdRng::seed_from_u64(4);
        let codec = CtcCodec::new(Charset::new("ab").unwrap());
        let mut model = ColumnCtcModel::new(3, 4, codec.num_classes(), ActivationFunction::Tanh, &mut rng);
        // "aa" needs three output steps, a 2-column line gives two
        let encoded = codec.encode(&["aa".to_string()], 4).unwrap();
        let strategy = LossStrategy::for_mode(PredictionMode::SequenceAlignmentFree);

        let out = strategy.forward(&mut model, &one_line(2), &encoded).unwrap();
        assert_eq!(out.loss, f64::INFINITY);

        let out = strategy.with_zero_infinity(true).forward(&mut model, &one_line(2), &encoded).unwrap();
        assert_eq!(out.loss, 0.0);
        assert!(out.grad.data().iter().all(|&g| g == 0.0));
    }
}
