//! Scripted collaborators for the loop and orchestrator tests.

use std::collections::VecDeque;

use crate::codec::{Charset, CtcCodec, TargetIndices};
use crate::data::batch::Sample;
use crate::data::loader::InMemoryLoader;
use crate::data::raster::{ImageBatch, LineImage};
use crate::error::{TrainError, TrainResult};
use crate::layers::parameter::Parameter;
use crate::math::matrix::Matrix;
use crate::math::tensor::Tensor3;
use crate::model::{PredictionMode, RecognitionModel};

/// Returns queued logits, one tensor per forward call, and ignores its input.
pub struct ScriptedModel {
    mode: PredictionMode,
    training: bool,
    script: VecDeque<Tensor3>,
    pub param: Parameter,
    pub forwards: usize,
    pub training_flags: Vec<bool>,
}

impl ScriptedModel {
    pub fn new(mode: PredictionMode) -> ScriptedModel {
        ScriptedModel {
            mode,
            training: false,
            script: VecDeque::new(),
            param: Parameter::new(Matrix::zeros(1, 2)),
            forwards: 0,
            training_flags: Vec::new(),
        }
    }

    pub fn push(&mut self, logits: Tensor3) -> &mut Self {
        self.script.push_back(logits);
        self
    }
}

impl RecognitionModel for ScriptedModel {
    fn prediction_mode(&self) -> PredictionMode {
        self.mode
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn forward(&mut self, _images: &ImageBatch, _decoder_input: Option<&TargetIndices>) -> TrainResult<Tensor3> {
        self.forwards += 1;
        self.training_flags.push(self.training);
        self.script
            .pop_front()
            .ok_or_else(|| TrainError::InvalidState("scripted model ran out of outputs".into()))
    }

    fn backward(&mut self, _grad_logits: &Tensor3) -> TrainResult<()> {
        self.param.grad.data.iter_mut().for_each(|g| *g += 1.0);
        Ok(())
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.param]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.param]
    }
}

/// CTC codec over `"ab"`: blank 0, `a` 1, `b` 2.
pub fn ctc_codec() -> CtcCodec {
    CtcCodec::new(Charset::new("ab").unwrap())
}

/// Logits `[labels.len(), time, 3]` whose greedy CTC decode is exactly
/// `labels`: each character at an even step, blanks in between.
pub fn ctc_logits(labels: &[&str], time: usize) -> Tensor3 {
    let mut t = Tensor3::zeros(labels.len(), time, 3);
    for (b, label) in labels.iter().enumerate() {
        let mut path = vec![0usize; time];
        for (i, c) in label.chars().enumerate() {
            path[2 * i] = if c == 'a' { 1 } else { 2 };
        }
        for (s, &k) in path.iter().enumerate() {
            t.lane_mut(b, s)[k] = 10.0;
        }
    }
    t
}

/// Unshuffled loader over blank 2×6 images.
pub fn loader(labels: &[&str], batch_size: usize) -> InMemoryLoader {
    let samples = labels
        .iter()
        .map(|l| Sample { image: LineImage::blank(2, 6), label: l.to_string() })
        .collect();
    InMemoryLoader::new(samples, batch_size, false, 0).unwrap()
}
