use strsim::levenshtein;

use crate::codec::LabelCodec;
use crate::error::{TrainError, TrainResult};
use crate::math::tensor::Tensor3;
use crate::telemetry::{MetricsSink, Phase};

/// Exact-match count and summed edit distance for one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct BatchMetrics {
    pub n_correct: usize,
    pub edit_distance: f64,
}

/// Compares decoded predictions with ground truth, pair by pair.
///
/// Edit distance is Levenshtein over Unicode scalar values.
pub fn score_predictions<P: AsRef<str>, G: AsRef<str>>(
    predictions: &[P],
    labels: &[G],
) -> TrainResult<BatchMetrics> {
    if predictions.len() != labels.len() {
        return Err(TrainError::shape(format!(
            "{} predictions for {} labels",
            predictions.len(),
            labels.len()
        )));
    }
    let mut metrics = BatchMetrics::default();
    for (pred, gt) in predictions.iter().zip(labels) {
        let (pred, gt) = (pred.as_ref(), gt.as_ref());
        if pred == gt {
            metrics.n_correct += 1;
        }
        metrics.edit_distance += levenshtein(pred, gt) as f64;
    }
    Ok(metrics)
}

/// Decodes raw `logits` `[batch, time, classes]` and scores them against
/// `labels`.
///
/// Logs the first prediction/label pair of the batch as text under
/// `<PHASE>/pred`.
pub fn score_batch(
    codec: &dyn LabelCodec,
    logits: &Tensor3,
    labels: &[String],
    sink: &mut dyn MetricsSink,
    phase: Phase,
    step: u64,
) -> TrainResult<BatchMetrics> {
    let decoded = codec.decode(&logits.softmax());
    let predictions: Vec<&str> = decoded.iter().map(|d| d.text.as_str()).collect();
    let metrics = score_predictions(&predictions, labels)?;

    if let (Some(pred), Some(gt)) = (predictions.first(), labels.first()) {
        sink.record_text(&phase.tag("pred"), &format!("pred: {pred} -- gt:{gt}"), step);
    }
    Ok(metrics)
}
