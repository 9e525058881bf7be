use crate::codec::{Charset, Decoded, EncodedTargets, LabelCodec, TargetIndices};
use crate::error::{TrainError, TrainResult};
use crate::math::tensor::{argmax, Tensor3};

/// `[GO]`: decoder start token, also the padding index.
pub const GO: usize = 0;
/// `[s]`: end of sequence.
pub const EOS: usize = 1;

/// Codec for autoregressive attention decoders.
///
/// A label `c1..cn` encodes to `[GO] c1 .. cn [s]` padded with `[GO]` to
/// `max_length + 2` columns; its length counts the characters plus `[s]`.
#[derive(Debug, Clone)]
pub struct AttnCodec {
    charset: Charset,
}

impl AttnCodec {
    pub fn new(charset: Charset) -> AttnCodec {
        AttnCodec { charset }
    }
}

impl LabelCodec for AttnCodec {
    fn num_classes(&self) -> usize {
        self.charset.len() + 2
    }

    fn encode(&self, labels: &[String], max_length: usize) -> TrainResult<EncodedTargets> {
        let cols = max_length + 2;
        let mut data = vec![GO; labels.len() * cols];
        let mut lengths = Vec::with_capacity(labels.len());
        for (row, label) in labels.iter().enumerate() {
            let indices = self.charset.indices(label, 2)?;
            if indices.len() > max_length {
                return Err(TrainError::Codec(format!(
                    "label '{label}' has {} characters, batch_max_length is {max_length}",
                    indices.len()
                )));
            }
            let start = row * cols + 1;
            data[start..start + indices.len()].copy_from_slice(&indices);
            data[start + indices.len()] = EOS;
            lengths.push(indices.len() + 1);
        }
        EncodedTargets::new(TargetIndices::new(labels.len(), cols, data)?, lengths)
    }

    /// Confidence is the product of the per-step maxima up to and including
    /// the `[s]` step.
    fn decode(&self, probabilities: &Tensor3) -> Vec<Decoded> {
        let [batch, steps, _] = probabilities.dims();
        (0..batch)
            .map(|b| {
                let mut text = String::new();
                let mut confidence = 1.0;
                for t in 0..steps {
                    let (idx, p) = argmax(probabilities.lane(b, t));
                    confidence *= p;
                    if idx == EOS {
                        break;
                    }
                    if idx >= 2 {
                        if let Some(c) = self.charset.char_at(idx - 2) {
                            text.push(c);
                        }
                    }
                }
                if steps == 0 {
                    confidence = 0.0;
                }
                Decoded { text, confidence }
            })
            .collect()
    }
}
