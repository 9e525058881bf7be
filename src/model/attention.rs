use rand::Rng;

use crate::activation::activation::ActivationFunction;
use crate::codec::attention::GO;
use crate::codec::TargetIndices;
use crate::data::raster::ImageBatch;
use crate::error::{TrainError, TrainResult};
use crate::layers::linear::Linear;
use crate::layers::parameter::Parameter;
use crate::math::matrix::Matrix;
use crate::math::tensor::{argmax, softmax_in_place, Tensor3};
use crate::model::{PredictionMode, RecognitionModel};

/// Autoregressive recogniser with scaled dot-product attention over columns.
///
/// Encoder: each pixel column → Linear → activation, giving `e_t`.
/// Decoder step with previous token `y`:
///   q    = embedding[y]
///   α    = softmax_t(e_t · q / √hidden)
///   ctx  = Σ_t α_t e_t
///   out  = Linear([ctx ; q])
pub struct AttentionModel {
    encoder: Linear,
    activation: ActivationFunction,
    embedding: Parameter,  // [num_classes, hidden]
    output: Linear,
    max_decode_steps: usize,
    training: bool,
    cache: Option<AttentionCache>,
}

struct AttentionCache {
    batch: usize,
    width: usize,
    steps: usize,
    pre: Matrix,
    encoded: Matrix,
    tokens: Vec<usize>,
    alphas: Vec<f64>,
}

impl AttentionModel {
    pub fn new<R: Rng + ?Sized>(
        image_height: usize,
        hidden_size: usize,
        num_classes: usize,
        activation: ActivationFunction,
        max_decode_steps: usize,
        rng: &mut R,
    ) -> AttentionModel {
        AttentionModel {
            encoder: Linear::new(image_height, hidden_size, rng),
            activation,
            embedding: Parameter::new(Matrix::xavier(num_classes, hidden_size, rng)),
            output: Linear::new(2 * hidden_size, num_classes, rng),
            max_decode_steps,
            training: true,
            cache: None,
        }
    }

    fn hidden_size(&self) -> usize {
        self.encoder.output_size()
    }

    fn scale(&self) -> f64 {
        1.0 / (self.hidden_size() as f64).sqrt()
    }

    /// Builds the `[ctx ; q]` rows for `steps` decoder steps of every sample.
    /// `tokens` is `[batch, steps]` row-major. Returns the rows and the
    /// attention weights `[batch, steps, width]`.
    fn attend(
        &self,
        encoded: &Matrix,
        batch: usize,
        width: usize,
        tokens: &[usize],
        steps: usize,
    ) -> TrainResult<(Matrix, Vec<f64>)> {
        let hidden = self.hidden_size();
        let scale = self.scale();
        let mut features = Matrix::zeros(batch * steps, 2 * hidden);
        let mut alphas = vec![0.0; batch * steps * width];

        for b in 0..batch {
            for s in 0..steps {
                let r = b * steps + s;
                let token = tokens[r];
                if token >= self.embedding.value.rows {
                    return Err(TrainError::shape(format!(
                        "decoder token {token} outside {} classes",
                        self.embedding.value.rows
                    )));
                }
                let q = self.embedding.value.row(token);

                let alpha = &mut alphas[r * width..(r + 1) * width];
                for (t, a) in alpha.iter_mut().enumerate() {
                    *a = dot(encoded.row(b * width + t), q) * scale;
                }
                softmax_in_place(alpha);

                let row = features.row_mut(r);
                for (t, &a) in alpha.iter().enumerate() {
                    for (c, e) in row[..hidden].iter_mut().zip(encoded.row(b * width + t)) {
                        *c += a * e;
                    }
                }
                row[hidden..].copy_from_slice(q);
            }
        }
        Ok((features, alphas))
    }

    fn decode_greedy(&mut self, encoded: &Matrix, batch: usize, width: usize) -> TrainResult<Tensor3> {
        let steps = self.max_decode_steps;
        let classes = self.output.output_size();
        let mut logits = Tensor3::zeros(batch, steps, classes);
        let mut tokens = vec![GO; batch];

        for s in 0..steps {
            let (features, _) = self.attend(encoded, batch, width, &tokens, 1)?;
            let step_logits = self.output.forward(&features, false)?;
            for (b, token) in tokens.iter_mut().enumerate() {
                let lane = step_logits.row(b);
                logits.lane_mut(b, s).copy_from_slice(lane);
                *token = argmax(lane).0;
            }
        }
        Ok(logits)
    }
}

impl RecognitionModel for AttentionModel {
    fn prediction_mode(&self) -> PredictionMode {
        PredictionMode::AutoregressiveAttention
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn forward(&mut self, images: &ImageBatch, decoder_input: Option<&TargetIndices>) -> TrainResult<Tensor3> {
        if images.height != self.encoder.input_size() {
            return Err(TrainError::shape(format!(
                "model expects {}-pixel-high lines, got {}",
                self.encoder.input_size(),
                images.height
            )));
        }
        if images.width == 0 {
            return Err(TrainError::shape("cannot attend over a zero-width batch"));
        }
        let (batch, width) = (images.batch, images.width);
        let pre = self.encoder.forward(&images.columns(), self.training)?;
        let encoded = self.activation.apply(&pre);
        self.cache = None;

        let Some(tokens) = decoder_input else {
            return self.decode_greedy(&encoded, batch, width);
        };
        if tokens.rows != batch {
            return Err(TrainError::shape(format!(
                "{} decoder rows for a batch of {batch}",
                tokens.rows
            )));
        }

        let steps = tokens.cols;
        let (features, alphas) = self.attend(&encoded, batch, width, &tokens.data, steps)?;
        let logits = self.output.forward(&features, self.training)?;
        if self.training {
            self.cache = Some(AttentionCache {
                batch,
                width,
                steps,
                pre,
                encoded,
                tokens: tokens.data.clone(),
                alphas,
            });
        }
        Tensor3::from_matrix(batch, steps, logits)
    }

    fn backward(&mut self, grad_logits: &Tensor3) -> TrainResult<()> {
        let cache = self.cache.take().ok_or_else(|| {
            TrainError::InvalidState("backward called without a teacher-forced training pass".into())
        })?;
        let AttentionCache { batch, width, steps, pre, encoded, tokens, alphas } = cache;
        if grad_logits.dims()[..2] != [batch, steps] {
            return Err(TrainError::shape(format!(
                "gradient {:?} does not match logits [{batch}, {steps}, _]",
                grad_logits.dims()
            )));
        }

        let hidden = self.hidden_size();
        let scale = self.scale();
        let grad_features = self.output.backward(&grad_logits.to_matrix())?;
        let mut grad_encoded = Matrix::zeros(batch * width, hidden);

        for b in 0..batch {
            for s in 0..steps {
                let r = b * steps + s;
                let token = tokens[r];
                let g_row = grad_features.row(r);
                let (g_ctx, g_q) = g_row.split_at(hidden);
                let q = self.embedding.value.row(token).to_vec();
                let alpha = &alphas[r * width..(r + 1) * width];

                // ∂L/∂α_t = g_ctx · e_t, then through the softmax.
                let d_alpha: Vec<f64> = (0..width)
                    .map(|t| dot(g_ctx, encoded.row(b * width + t)))
                    .collect();
                let mean: f64 = alpha.iter().zip(&d_alpha).map(|(a, d)| a * d).sum();

                let mut d_q = g_q.to_vec();
                for t in 0..width {
                    let d_score = alpha[t] * (d_alpha[t] - mean) * scale;
                    let e_t = encoded.row(b * width + t);
                    for (dq, e) in d_q.iter_mut().zip(e_t) {
                        *dq += d_score * e;
                    }
                    let de = grad_encoded.row_mut(b * width + t);
                    for k in 0..hidden {
                        de[k] += alpha[t] * g_ctx[k] + d_score * q[k];
                    }
                }

                for (g, dq) in self.embedding.grad.row_mut(token).iter_mut().zip(d_q) {
                    *g += dq;
                }
            }
        }

        let grad_pre = self.activation.backprop(&pre, &grad_encoded);
        self.encoder.backward(&grad_pre)?;
        Ok(())
    }

    fn parameters(&self) -> Vec<&Parameter> {
        let mut params = self.encoder.parameters();
        params.push(&self.embedding);
        params.extend(self.output.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        let mut params = self.encoder.parameters_mut();
        params.push(&mut self.embedding);
        params.extend(self.output.parameters_mut());
        params
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
