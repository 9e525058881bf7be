use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::data::loader::DataLoader;
use crate::error::TrainResult;
use crate::model::RecognitionModel;
use crate::telemetry::Phase;
use crate::train::context::TrainContext;
use crate::train::epoch_result::EvalTotals;
use crate::train::scorer::score_batch;

/// Scores `model` on up to `max_batches` batches of `loader`.
///
/// The model is put in evaluation mode first: nothing is cached for a
/// backward pass and attention models decode free-running. Parameters and
/// optimizer state are never touched. Text samples are logged under
/// `VAL/pred` at the current global step.
///
/// Returns raw counters; normalising them is the caller's job.
pub fn evaluate(
    ctx: &mut TrainContext,
    model: &mut dyn RecognitionModel,
    loader: &mut dyn DataLoader,
    max_batches: Option<usize>,
    desc: &str,
) -> TrainResult<EvalTotals> {
    model.set_training(false);

    let declared = loader.batch_count();
    let limit = max_batches.map_or(declared, |m| m.min(declared));
    let step = ctx.global_step.get();

    let bar = if ctx.config.show_progress {
        let bar = ProgressBar::new(limit as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} {elapsed_precise}") {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(desc.to_string());
        Some(bar)
    } else {
        None
    };

    let mut totals = EvalTotals::default();
    for (i, batch) in loader.batches().enumerate() {
        if i >= limit {
            break;
        }
        let batch = batch?;
        let logits = model.forward(&batch.images, None)?;
        let metrics = score_batch(
            ctx.codec.as_ref(),
            &logits,
            &batch.labels,
            ctx.sink.as_mut(),
            Phase::Val,
            step,
        )?;
        totals.n_correct += metrics.n_correct;
        totals.edit_distance += metrics.edit_distance;
        totals.samples += batch.len();
        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    debug!("{}: {}/{} correct over {} batches", desc, totals.n_correct, totals.samples, limit);
    Ok(totals)
}
