pub mod best;
pub mod context;
pub mod epoch_result;
pub mod eval_loop;
pub mod orchestrator;
pub mod scorer;
pub mod step;
pub mod train_config;
pub mod train_loop;

#[cfg(test)]
pub(crate) mod testing;

pub use best::{select_best, BestDecision, BestMetrics};
pub use context::TrainContext;
pub use epoch_result::{EpochResult, EvalTotals, ValidationSummary};
pub use eval_loop::evaluate;
pub use orchestrator::TrainingOrchestrator;
pub use scorer::{score_batch, score_predictions, BatchMetrics};
pub use step::GlobalStep;
pub use train_config::{NonFinitePolicy, TrainConfig};
pub use train_loop::train_epoch;
