use std::path::Path;

use tracing::info;

use crate::checkpoint::{CheckpointRecord, PersistenceBackend};
use crate::data::loader::DataLoader;
use crate::error::{TrainError, TrainResult};
use crate::loss::strategy::LossStrategy;
use crate::model::{load_parameter_values, parameter_values, RecognitionModel};
use crate::optim::Optimizer;
use crate::train::best::{select_best, BestDecision, BestMetrics};
use crate::train::context::TrainContext;
use crate::train::epoch_result::{EpochResult, ValidationSummary};
use crate::train::eval_loop::evaluate;
use crate::train::train_loop::train_epoch;

/// Runs the epoch sequence: train, validate, pick the best, save.
///
/// Owns the only long-lived mutable run state, the `BestMetrics` value and
/// (through the context) the global step.
pub struct TrainingOrchestrator {
    ctx: TrainContext,
    model: Box<dyn RecognitionModel>,
    strategy: LossStrategy,
    optimizer: Box<dyn Optimizer>,
    train_loader: Box<dyn DataLoader>,
    val_loader: Option<Box<dyn DataLoader>>,
    persistence: Box<dyn PersistenceBackend>,
    best: BestMetrics,
    start_epoch: usize,
}

impl TrainingOrchestrator {
    /// The loss strategy is chosen from the model's prediction mode, with
    /// `ctc_zero_infinity` taken from the config.
    pub fn new(
        ctx: TrainContext,
        model: Box<dyn RecognitionModel>,
        optimizer: Box<dyn Optimizer>,
        train_loader: Box<dyn DataLoader>,
        val_loader: Option<Box<dyn DataLoader>>,
        persistence: Box<dyn PersistenceBackend>,
    ) -> TrainResult<Self> {
        ctx.config.validate()?;
        let strategy =
            LossStrategy::for_mode(model.prediction_mode()).with_zero_infinity(ctx.config.ctc_zero_infinity);
        Ok(TrainingOrchestrator {
            ctx,
            model,
            strategy,
            optimizer,
            train_loader,
            val_loader,
            persistence,
            best: BestMetrics::sentinel(),
            start_epoch: 1,
        })
    }

    pub fn best(&self) -> &BestMetrics {
        &self.best
    }

    pub fn context(&self) -> &TrainContext {
        &self.ctx
    }

    pub fn model(&self) -> &dyn RecognitionModel {
        self.model.as_ref()
    }

    /// First epoch `run` will train.
    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    /// Restores weights, counters and best metrics from a checkpoint so the
    /// next `run` continues after its epoch.
    pub fn resume(&mut self, path: &Path) -> TrainResult<()> {
        let record = self.persistence.load(path)?;
        if record.mode != self.model.prediction_mode() {
            return Err(TrainError::Checkpoint(format!(
                "{} holds a {} model, this run trains {}",
                path.display(),
                record.mode,
                self.model.prediction_mode()
            )));
        }
        load_parameter_values(self.model.as_mut(), &record.parameters)?;
        self.ctx.global_step.resume_from(record.global_step);
        self.optimizer.load_state(record.optimizer)?;
        self.best = record.best;
        self.start_epoch = record.epoch + 1;
        info!(
            "resumed from {} at epoch {}, global_step {}",
            path.display(),
            record.epoch,
            record.global_step
        );
        Ok(())
    }

    /// Trains the configured number of epochs and returns the final best
    /// metrics.
    ///
    /// Resumes first when `resume_checkpoint` is configured.
    pub fn run(&mut self) -> TrainResult<BestMetrics> {
        if let Some(path) = self.ctx.config.resume_checkpoint.clone() {
            if self.start_epoch == 1 {
                self.resume(&path)?;
            }
        }
        self.check_datasets()?;

        let epochs = self.ctx.config.epochs;
        for epoch in self.start_epoch..=epochs {
            let result = train_epoch(
                &mut self.ctx,
                epoch,
                self.model.as_mut(),
                self.train_loader.as_mut(),
                &self.strategy,
                self.optimizer.as_mut(),
            )?;
            info!(
                "[{}/{}], train_loss: {:.4}, train_acc: {:.4}, time: {:.4}, lr: {:.2e}",
                epoch, epochs, result.train_loss, result.train_acc, result.time, result.lr
            );

            let validation = self.validate(epoch)?;
            self.finish_epoch(&result, validation.as_ref())?;
        }

        self.report();
        Ok(self.best.clone())
    }

    // ── Per-epoch steps ───────────────────────────────────────────────────

    fn check_datasets(&self) -> TrainResult<()> {
        let train = self.train_loader.as_ref();
        if train.dataset_len() == 0 || train.batch_count() == 0 {
            return Err(TrainError::EmptyDataset("training set is empty".into()));
        }
        info!(
            "train dataset has {} samples, {} in train loader",
            train.dataset_len(),
            train.batch_count()
        );
        if let Some(val) = self.val_loader.as_deref() {
            if val.dataset_len() == 0 {
                return Err(TrainError::EmptyDataset("validation set is empty".into()));
            }
            info!(
                "eval dataset has {} samples, {} in eval loader",
                val.dataset_len(),
                val.batch_count()
            );
        }
        Ok(())
    }

    fn validate(&mut self, epoch: usize) -> TrainResult<Option<ValidationSummary>> {
        let max_batches = self.ctx.config.eval_max_batches;
        let Some(val) = self.val_loader.as_deref_mut() else {
            return Ok(None);
        };
        let capped = max_batches.is_some_and(|m| m < val.batch_count());
        let totals = evaluate(&mut self.ctx, self.model.as_mut(), val, max_batches, "Eval")?;
        // a capped pass is normalised by what it scored, not by the full split
        let denominator = if capped { totals.samples } else { val.dataset_len() };
        let summary = ValidationSummary::from_totals(&totals, denominator)?;

        let step = self.ctx.global_step.get();
        self.ctx.sink.record_scalar("EVAL/acc", summary.val_acc, step);
        self.ctx.sink.record_scalar("EVAL/edit_distance", summary.edit_distance, step);
        info!(
            "[{}/{}], val_acc: {:.6}, edit_distance: {:.6}",
            epoch, self.ctx.config.epochs, summary.val_acc, summary.edit_distance
        );
        Ok(Some(summary))
    }

    fn finish_epoch(&mut self, result: &EpochResult, validation: Option<&ValidationSummary>) -> TrainResult<()> {
        let path = self.ctx.config.latest_checkpoint_path();
        let decision = select_best(&self.best, result, validation, &path);
        let is_best = decision.is_best();
        if let BestDecision::Improved(best) = decision {
            self.best = best;
        }

        let record = CheckpointRecord::new(
            result.epoch,
            self.ctx.global_step.get(),
            self.optimizer.state(),
            self.model.prediction_mode(),
            parameter_values(self.model.as_ref()),
            self.best.clone(),
        );
        self.persistence.save(&record, &path, is_best)
    }

    fn report(&mut self) {
        let best = &self.best;
        info!("val_acc: {}", best.val_acc);
        info!("train_loss: {}", best.train_loss);
        info!("train_acc: {}", best.train_acc);
        info!("best_model: {}", best.best_model_path);
        info!("best_model_epoch: {}", best.best_model_epoch);
        info!("finish train");
        self.ctx.sink.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    use super::*;
    use crate::math::tensor::Tensor3;
    use crate::model::PredictionMode;
    use crate::optim::{OptimizerState, Sgd};
    use crate::telemetry::MemorySink;
    use crate::train::testing::{ctc_codec, ctc_logits, loader, ScriptedModel};
    use crate::train::train_config::TrainConfig;

    type Saves = Rc<RefCell<Vec<(CheckpointRecord, PathBuf, bool)>>>;

    /// Keeps every save in memory; `load` hands back the latest one.
    struct RecordingBackend {
        saves: Saves,
    }

    impl PersistenceBackend for RecordingBackend {
        fn save(&mut self, record: &CheckpointRecord, path: &Path, mark_as_best: bool) -> TrainResult<()> {
            self.saves.borrow_mut().push((record.clone(), path.to_path_buf(), mark_as_best));
            Ok(())
        }

        fn load(&self, _path: &Path) -> TrainResult<CheckpointRecord> {
            self.saves
                .borrow()
                .last()
                .map(|(r, _, _)| r.clone())
                .ok_or_else(|| TrainError::Checkpoint("nothing saved".into()))
        }
    }

    struct Harness {
        orchestrator: TrainingOrchestrator,
        saves: Saves,
        sink: Rc<RefCell<MemorySink>>,
    }

    /// One training batch of `["a", "b"]` per epoch. `train_preds[e]` and
    /// `val_preds[e]` are what the model "reads" in epoch `e + 1`.
    fn harness(train_preds: &[[&str; 2]], val_preds: Option<&[[&str; 2]]>) -> Harness {
        let mut model = ScriptedModel::new(PredictionMode::SequenceAlignmentFree);
        for (e, preds) in train_preds.iter().enumerate() {
            model.push(ctc_logits(preds, 4));
            if let Some(val) = val_preds {
                model.push(ctc_logits(&val[e], 4));
            }
        }
        let mut config = TrainConfig::new(train_preds.len(), "run/ckpt");
        config.batch_max_length = 2;
        let sink = Rc::new(RefCell::new(MemorySink::new()));
        let ctx = TrainContext::new(config, Box::new(ctc_codec()), Box::new(sink.clone()));
        let saves: Saves = Rc::new(RefCell::new(Vec::new()));
        let val_loader: Option<Box<dyn DataLoader>> = val_preds.map(|_| Box::new(loader(&["a", "b"], 2)) as Box<dyn DataLoader>);
        let orchestrator = TrainingOrchestrator::new(
            ctx,
            Box::new(model),
            Box::new(Sgd::new(0.1)),
            Box::new(loader(&["a", "b"], 2)),
            val_loader,
            Box::new(RecordingBackend { saves: saves.clone() }),
        )
        .unwrap();
        Harness { orchestrator, saves, sink }
    }

    fn best_flags(saves: &Saves) -> Vec<bool> {
        saves.borrow().iter().map(|(_, _, best)| *best).collect()
    }

    #[test]
    fn validation_drives_the_best_checkpoint() {
        let train = [["a", "b"]; 3];
        let val = [["b", "a"], ["a", "b"], ["a", "a"]];
        let mut h = harness(&train, Some(&val[..]));

        let best = h.orchestrator.run().unwrap();

        assert_eq!(best_flags(&h.saves), vec![true, true, false]);
        assert_eq!(best.best_model_epoch, 2);
        assert_eq!(best.val_acc, 1.0);
        assert_eq!(best.best_model_path, Path::new("run/ckpt").join("model_latest.json").display().to_string());

        let saves = h.saves.borrow();
        assert!(saves.iter().all(|(_, path, _)| path.ends_with("model_latest.json")));
        let epochs: Vec<usize> = saves.iter().map(|(r, _, _)| r.epoch).collect();
        assert_eq!(epochs, vec![1, 2, 3]);
        assert_eq!(saves[2].0.global_step, 3);
        assert_eq!(saves[2].0.best.best_model_epoch, 2);

        let sink = h.sink.borrow();
        assert_eq!(sink.scalars("EVAL/acc"), vec![(1, 0.0), (2, 1.0), (3, 0.5)]);
        assert_eq!(sink.scalars("EVAL/edit_distance"), vec![(1, 1.0), (2, 0.0), (3, 0.5)]);
        assert_eq!(sink.texts("VAL/pred").len(), 3);
    }

    #[test]
    fn capped_validation_is_normalised_by_scored_samples() {
        let mut model = ScriptedModel::new(PredictionMode::SequenceAlignmentFree);
        model.push(ctc_logits(&["a", "b"], 4)).push(ctc_logits(&["a", "b"], 4));
        let mut config = TrainConfig::new(1, "run/ckpt");
        config.batch_max_length = 2;
        config.eval_max_batches = Some(1);
        let sink = Rc::new(RefCell::new(MemorySink::new()));
        let ctx = TrainContext::new(config, Box::new(ctc_codec()), Box::new(sink.clone()));
        let saves: Saves = Rc::new(RefCell::new(Vec::new()));
        let mut orchestrator = TrainingOrchestrator::new(
            ctx,
            Box::new(model),
            Box::new(Sgd::new(0.1)),
            Box::new(loader(&["a", "b"], 2)),
            // only the first of two batches is scored
            Some(Box::new(loader(&["a", "b", "b", "a"], 2))),
            Box::new(RecordingBackend { saves: saves.clone() }),
        )
        .unwrap();

        let best = orchestrator.run().unwrap();

        assert_eq!(best.val_acc, 1.0);
        assert_eq!(saves.borrow()[0].0.best.val_acc, 1.0);
        let sink = sink.borrow();
        assert_eq!(sink.scalars("EVAL/acc"), vec![(1, 1.0)]);
        assert_eq!(sink.scalars("EVAL/edit_distance"), vec![(1, 0.0)]);
        assert_eq!(sink.texts("VAL/pred").len(), 1);
    }

    #[test]
    fn a_cap_above_the_batch_count_keeps_the_full_denominator() {
        let mut model = ScriptedModel::new(PredictionMode::SequenceAlignmentFree);
        model.push(ctc_logits(&["a", "b"], 4)).push(ctc_logits(&["a", "a"], 4));
        let mut config = TrainConfig::new(1, "run/ckpt");
        config.batch_max_length = 2;
        config.eval_max_batches = Some(5);
        let sink = Rc::new(RefCell::new(MemorySink::new()));
        let ctx = TrainContext::new(config, Box::new(ctc_codec()), Box::new(sink.clone()));
        let mut orchestrator = TrainingOrchestrator::new(
            ctx,
            Box::new(model),
            Box::new(Sgd::new(0.1)),
            Box::new(loader(&["a", "b"], 2)),
            Some(Box::new(loader(&["a", "b"], 2))),
            Box::new(RecordingBackend { saves: Rc::new(RefCell::new(Vec::new())) }),
        )
        .unwrap();

        let best = orchestrator.run().unwrap();

        assert_eq!(best.val_acc, 0.5);
        assert_eq!(sink.borrow().scalars("EVAL/acc"), vec![(1, 0.5)]);
    }

    fn infeasible_label_run(zero_infinity: bool) -> TrainResult<BestMetrics> {
        let mut model = ScriptedModel::new(PredictionMode::SequenceAlignmentFree);
        // two output steps cannot carry "aa"
        model.push(Tensor3::zeros(1, 2, 3));
        let mut config = TrainConfig::new(1, "run/ckpt");
        config.batch_max_length = 2;
        config.ctc_zero_infinity = zero_infinity;
        let ctx = TrainContext::without_metrics(config, Box::new(ctc_codec()));
        TrainingOrchestrator::new(
            ctx,
            Box::new(model),
            Box::new(Sgd::new(0.1)),
            Box::new(loader(&["aa"], 1)),
            None,
            Box::new(RecordingBackend { saves: Rc::new(RefCell::new(Vec::new())) }),
        )?
        .run()
    }

    #[test]
    fn ctc_zero_infinity_comes_from_the_config() {
        let err = infeasible_label_run(false).unwrap_err();
        assert!(matches!(err, TrainError::NonFiniteLoss { .. }));

        let best = infeasible_label_run(true).unwrap();
        assert_eq!(best.train_loss, 0.0);
        assert_eq!(best.best_model_epoch, 1);
    }

    #[test]
    fn without_validation_train_accuracy_must_improve() {
        let train = [["a", "a"], ["b", "b"], ["a", "b"]];
        let mut h = harness(&train, None);

        let best = h.orchestrator.run().unwrap();

        assert_eq!(best_flags(&h.saves), vec![true, false, true]);
        assert_eq!(best.best_model_epoch, 3);
        assert_eq!(best.train_acc, 1.0);
        assert_eq!(best.val_acc, f64::NEG_INFINITY);
    }

    #[test]
    fn evaluation_leaves_the_model_in_eval_mode_without_stepping() {
        let train = [["a", "b"]];
        let val = [["a", "b"]];
        let mut h = harness(&train, Some(&val[..]));
        h.orchestrator.run().unwrap();
        assert!(!h.orchestrator.model().is_training());
        assert_eq!(h.orchestrator.context().global_step.get(), 1);
        assert_eq!(h.saves.borrow()[0].0.optimizer.steps, 1);
    }

    #[test]
    fn resume_continues_after_the_saved_epoch() {
        let train = [["a", "b"], ["a", "b"], ["a", "b"]];
        let mut h = harness(&train, None);
        h.saves.borrow_mut().push((
            CheckpointRecord::new(
                2,
                17,
                OptimizerState { steps: 17, buffers: Vec::new() },
                PredictionMode::SequenceAlignmentFree,
                vec![vec![0.25, -0.5]],
                BestMetrics { train_acc: 0.5, best_model_epoch: 2, ..BestMetrics::sentinel() },
            ),
            PathBuf::from("old"),
            true,
        ));

        h.orchestrator.resume(Path::new("old")).unwrap();
        assert_eq!(h.orchestrator.start_epoch(), 3);
        let best = h.orchestrator.run().unwrap();

        let saves = h.saves.borrow();
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[1].0.epoch, 3);
        assert_eq!(saves[1].0.global_step, 18);
        assert_eq!(saves[1].0.optimizer.steps, 18);
        assert!(saves[1].2);
        assert_eq!(best.best_model_epoch, 3);
    }

    fn momentum_run(epochs: usize, saves: &Saves) -> TrainingOrchestrator {
        let mut model = ScriptedModel::new(PredictionMode::SequenceAlignmentFree);
        for _ in 0..epochs {
            model.push(ctc_logits(&["a", "b"], 4));
        }
        let mut config = TrainConfig::new(epochs, "run/ckpt");
        config.batch_max_length = 2;
        let mut sgd = Sgd::new(0.1);
        sgd.momentum = 0.5;
        TrainingOrchestrator::new(
            TrainContext::without_metrics(config, Box::new(ctc_codec())),
            Box::new(model),
            Box::new(sgd),
            Box::new(loader(&["a", "b"], 2)),
            None,
            Box::new(RecordingBackend { saves: saves.clone() }),
        )
        .unwrap()
    }

    #[test]
    fn resumed_momentum_matches_an_uninterrupted_run() {
        let straight: Saves = Rc::new(RefCell::new(Vec::new()));
        momentum_run(2, &straight).run().unwrap();

        let split: Saves = Rc::new(RefCell::new(Vec::new()));
        momentum_run(1, &split).run().unwrap();
        let mut resumed = momentum_run(2, &split);
        resumed.resume(Path::new("latest")).unwrap();
        resumed.run().unwrap();

        let straight = straight.borrow();
        let split = split.borrow();
        // grad is [1, 1] every step: v = 1 then 1.5, w = -0.1 then -0.25
        assert_eq!(split[1].0.parameters, straight[1].0.parameters);
        assert!((split[1].0.parameters[0][0] + 0.25).abs() < 1e-12);
        assert_eq!(split[1].0.optimizer, straight[1].0.optimizer);
    }

    #[test]
    fn resume_rejects_a_checkpoint_of_the_other_mode() {
        let mut h = harness(&[["a", "b"]], None);
        h.saves.borrow_mut().push((
            CheckpointRecord::new(1, 1, OptimizerState::default(), PredictionMode::AutoregressiveAttention, vec![], BestMetrics::sentinel()),
            PathBuf::from("old"),
            false,
        ));
        let err = h.orchestrator.resume(Path::new("old")).unwrap_err();
        assert!(matches!(err, TrainError::Checkpoint(_)));
    }

    #[test]
    fn empty_validation_set_fails_fast() {
        let mut model = ScriptedModel::new(PredictionMode::SequenceAlignmentFree);
        model.push(ctc_logits(&["a"], 4));
        let ctx = TrainContext::without_metrics(TrainConfig::new(1, "c"), Box::new(ctc_codec()));
        let saves: Saves = Rc::new(RefCell::new(Vec::new()));
        let mut orchestrator = TrainingOrchestrator::new(
            ctx,
            Box::new(model),
            Box::new(Sgd::new(0.1)),
            Box::new(loader(&["a"], 1)),
            Some(Box::new(loader(&[], 1))),
            Box::new(RecordingBackend { saves: saves.clone() }),
        )
        .unwrap();
        let err = orchestrator.run().unwrap_err();
        assert!(matches!(err, TrainError::EmptyDataset(_)));
        assert!(saves.borrow().is_empty());
        assert_eq!(orchestrator.context().global_step.get(), 0);
    }
}
