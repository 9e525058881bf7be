use std::time::Instant;

use tracing::{info, warn};

use crate::data::loader::DataLoader;
use crate::error::{TrainError, TrainResult};
use crate::loss::strategy::LossStrategy;
use crate::model::RecognitionModel;
use crate::optim::{clip_grad_norm, Optimizer};
use crate::telemetry::Phase;
use crate::train::context::TrainContext;
use crate::train::epoch_result::EpochResult;
use crate::train::scorer::score_batch;
use crate::train::train_config::NonFinitePolicy;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Runs one pass over `loader`, updating `model` in place.
///
/// # Arguments
/// - `ctx`       - run config, codec, metrics sink and the global step
/// - `epoch`     - 1-based epoch number, used for logging and errors
/// - `model`     - switched to training mode for the pass
/// - `loader`    - consumed up to its declared `batch_count`
/// - `strategy`  - must match `model.prediction_mode()`
/// - `optimizer` - stepped once per consumed batch
///
/// # Errors
/// `EmptyDataset` if the loader declares no batches or no samples,
/// `UnsupportedMode` if the strategy does not fit the model (checked before
/// the first batch), `NonFiniteLoss` under `NonFinitePolicy::Abort`, and
/// anything the codec, model or loss reports.
pub fn train_epoch(
    ctx: &mut TrainContext,
    epoch: usize,
    model: &mut dyn RecognitionModel,
    loader: &mut dyn DataLoader,
    strategy: &LossStrategy,
    optimizer: &mut dyn Optimizer,
) -> TrainResult<EpochResult> {
    let declared = loader.batch_count();
    let dataset_len = loader.dataset_len();
    if declared == 0 || dataset_len == 0 {
        return Err(TrainError::EmptyDataset(format!(
            "training loader declares {declared} batches over {dataset_len} samples"
        )));
    }
    strategy.ensure_supports(model.prediction_mode())?;

    let display_interval = ctx.config.display_interval.max(1);
    let max_length = ctx.config.batch_max_length;
    let clip = ctx.config.grad_clip_norm;
    let epochs = ctx.config.epochs;

    model.set_training(true);
    let epoch_start = Instant::now();

    let mut loss_sum = 0.0;
    let mut correct = 0usize;
    let mut lr = optimizer.learning_rate();
    let mut window = Window::new();

    for (i, batch) in loader.batches().enumerate() {
        if i >= declared {
            break;
        }
        let batch = batch?;
        let step = ctx.global_step.increment();
        lr = optimizer.learning_rate();

        let encoded = ctx.codec.encode(&batch.labels, max_length)?;
        let out = strategy.forward(model, &batch.images, &encoded)?;

        if out.loss.is_finite() {
            optimizer.zero_grad(&mut model.parameters_mut());
            model.backward(&out.grad)?;
            let grad_norm = {
                let mut params = model.parameters_mut();
                let norm = clip_grad_norm(&mut params, clip);
                optimizer.step(&mut params)?;
                norm
            };

            let metrics = score_batch(
                ctx.codec.as_ref(),
                &out.logits,
                &batch.labels,
                ctx.sink.as_mut(),
                Phase::Train,
                step,
            )?;
            loss_sum += out.loss;
            correct += metrics.n_correct;

            let n = batch.len() as f64;
            let sink = ctx.sink.as_mut();
            sink.record_scalar(&Phase::Train.tag("loss"), out.loss, step);
            sink.record_scalar(&Phase::Train.tag("acc"), metrics.n_correct as f64 / n, step);
            sink.record_scalar(&Phase::Train.tag("edit_distance"), metrics.edit_distance / n, step);
            sink.record_scalar(&Phase::Train.tag("lr"), lr, step);
            sink.record_scalar(&Phase::Train.tag("grad_norm"), grad_norm, step);

            window.add(out.loss, batch.len(), metrics.n_correct, metrics.edit_distance);
        } else {
            match ctx.config.non_finite_loss {
                NonFinitePolicy::Abort => {
                    return Err(TrainError::NonFiniteLoss { epoch, step, loss: out.loss });
                }
                NonFinitePolicy::SkipBatch => {
                    warn!("epoch {} step {}: loss is {}, skipping batch", epoch, step, out.loss);
                    window.skipped += 1;
                }
            }
        }

        if (i + 1) % display_interval == 0 {
            let speed = window.log(epoch, epochs, i + 1, declared, lr, step);
            ctx.sink.record_scalar(&Phase::Train.tag("speed"), speed, step);
            window = Window::new();
        }
    }

    Ok(EpochResult {
        epoch,
        train_loss: loss_sum / declared as f64,
        train_acc: correct as f64 / dataset_len as f64,
        lr,
        time: epoch_start.elapsed().as_secs_f64(),
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Counters for the batches since the last progress record.
struct Window {
    start: Instant,
    batches: usize,
    samples: usize,
    loss: f64,
    correct: usize,
    edit_distance: f64,
    skipped: usize,
}

impl Window {
    fn new() -> Window {
        Window { start: Instant::now(), batches: 0, samples: 0, loss: 0.0, correct: 0, edit_distance: 0.0, skipped: 0 }
    }

    fn add(&mut self, loss: f64, samples: usize, correct: usize, edit_distance: f64) {
        self.batches += 1;
        self.samples += samples;
        self.loss += loss;
        self.correct += correct;
        self.edit_distance += edit_distance;
    }

    /// Logs the window and returns its throughput in samples per second.
    fn log(&self, epoch: usize, epochs: usize, batch: usize, declared: usize, lr: f64, step: u64) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 { self.samples as f64 / elapsed } else { 0.0 };
        let (acc, edit) = if self.samples > 0 {
            (self.correct as f64 / self.samples as f64, self.edit_distance / self.samples as f64)
        } else {
            (0.0, 0.0)
        };
        let loss = if self.batches > 0 { self.loss / self.batches as f64 } else { 0.0 };
        info!(
            "[{}/{}], [{}/{}], global_step: {}, speed: {:.1} samples/sec, acc: {:.4}, loss: {:.4}, edit_distance: {:.4}, lr: {:.2e}, skipped: {}, time: {:.2}s",
            epoch, epochs, batch, declared, step, speed, acc, loss, edit, lr, self.skipped, elapsed
        );
        speed
    }
}
