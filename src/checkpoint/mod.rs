pub mod json_store;

pub use json_store::JsonCheckpointStore;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Deserialize};

use crate::error::TrainResult;
use crate::model::PredictionMode;
use crate::optim::OptimizerState;
use crate::train::best::BestMetrics;

pub const CHECKPOINT_VERSION: u32 = 2;

/// Everything needed to continue a run: weights plus the counters that
/// must survive a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub version: u32,
    pub created_unix_timestamp: u64,
    /// Last completed epoch.
    pub epoch: usize,
    pub global_step: u64,
    /// Step count (drives the LR schedule) and momentum buffers.
    pub optimizer: OptimizerState,
    pub mode: PredictionMode,
    /// Parameter values in `RecognitionModel::parameters()` order.
    pub parameters: Vec<Vec<f64>>,
    pub best: BestMetrics,
}

impl CheckpointRecord {
    pub fn new(
        epoch: usize,
        global_step: u64,
        optimizer: OptimizerState,
        mode: PredictionMode,
        parameters: Vec<Vec<f64>>,
        best: BestMetrics,
    ) -> CheckpointRecord {
        CheckpointRecord {
            version: CHECKPOINT_VERSION,
            created_unix_timestamp: current_unix_timestamp(),
            epoch,
            global_step,
            optimizer,
            mode,
            parameters,
            best,
        }
    }
}

/// Stores checkpoints. Called once per epoch with the "latest" path;
/// `mark_as_best` additionally tags that checkpoint as the run's best.
pub trait PersistenceBackend {
    fn save(&mut self, record: &CheckpointRecord, path: &Path, mark_as_best: bool) -> TrainResult<()>;

    fn load(&self, path: &Path) -> TrainResult<CheckpointRecord>;
}

fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
