pub mod clip;
pub mod schedule;
pub mod sgd;

pub use clip::clip_grad_norm;
pub use schedule::LrSchedule;
pub use sgd::Sgd;

use serde::{Serialize, Deserialize};

use crate::error::TrainResult;
use crate::layers::parameter::Parameter;

/// Optimizer state that has to survive a restart.
///
/// `buffers` holds one per-parameter slot (SGD momentum), in
/// `RecognitionModel::parameters()` order. Empty until the first step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub steps: u64,
    #[serde(default)]
    pub buffers: Vec<Vec<f64>>,
}

/// Updates parameters from their accumulated gradients.
pub trait Optimizer {
    fn zero_grad(&mut self, params: &mut [&mut Parameter]) {
        params.iter_mut().for_each(|p| p.zero_grad());
    }

    /// Applies one update and advances the schedule.
    fn step(&mut self, params: &mut [&mut Parameter]) -> TrainResult<()>;

    /// Learning rate the next `step` will use.
    fn learning_rate(&self) -> f64;

    /// Number of `step` calls applied so far.
    fn steps_taken(&self) -> u64;

    /// Snapshot for a checkpoint.
    fn state(&self) -> OptimizerState;

    /// Restores the schedule position and per-parameter buffers when a run
    /// resumes.
    fn load_state(&mut self, state: OptimizerState) -> TrainResult<()>;
}
