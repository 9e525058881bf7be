use crate::codec::{Charset, Decoded, EncodedTargets, LabelCodec, TargetIndices};
use crate::error::{TrainError, TrainResult};
use crate::math::tensor::{argmax, Tensor3};

/// Class 0 is the CTC blank.
pub const BLANK: usize = 0;

/// Codec for alignment-free (CTC) models.
///
/// Encoding pads with the blank index to `max_length`; decoding is greedy:
/// per-step argmax, merge repeats, drop blanks.
#[derive(Debug, Clone)]
pub struct CtcCodec {
    charset: Charset,
}

impl CtcCodec {
    pub fn new(charset: Charset) -> CtcCodec {
        CtcCodec { charset }
    }
}

impl LabelCodec for CtcCodec {
    fn num_classes(&self) -> usize {
        self.charset.len() + 1
    }

    fn encode(&self, labels: &[String], max_length: usize) -> TrainResult<EncodedTargets> {
        let mut data = vec![BLANK; labels.len() * max_length];
        let mut lengths = Vec::with_capacity(labels.len());
        for (row, label) in labels.iter().enumerate() {
            let indices = self.charset.indices(label, 1)?;
            if indices.len() > max_length {
                return Err(TrainError::Codec(format!(
                    "label '{label}' has {} characters, batch_max_length is {max_length}",
                    indices.len()
                )));
            }
            data[row * max_length..row * max_length + indices.len()].copy_from_slice(&indices);
            lengths.push(indices.len());
        }
        EncodedTargets::new(TargetIndices::new(labels.len(), max_length, data)?, lengths)
    }

    fn decode(&self, probabilities: &Tensor3) -> Vec<Decoded> {
        let [batch, time, _] = probabilities.dims();
        (0..batch)
            .map(|b| {
                let mut text = String::new();
                let mut confidence = 1.0;
                let mut prev = BLANK;
                for t in 0..time {
                    let (idx, p) = argmax(probabilities.lane(b, t));
                    confidence *= p;
                    if idx != BLANK && idx != prev {
                        if let Some(c) = self.charset.char_at(idx - 1) {
                            text.push(c);
                        }
                    }
                    prev = idx;
                }
                if time == 0 {
                    confidence = 0.0;
                }
                Decoded { text, confidence }
            })
            .collect()
    }
}
